use crate::detach::Detached;
use crate::error::{DaemonError, DaemonResult};
use std::mem;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::ptr;

// =========================================================================
// errno
// =========================================================================

#[cfg(any(
    target_os = "linux",
    target_os = "emscripten",
    target_os = "fuchsia",
    target_os = "redox"
))]
unsafe fn errno_location() -> *mut libc::c_int {
    unsafe { libc::__errno_location() }
}

#[cfg(any(target_os = "android", target_os = "netbsd", target_os = "openbsd"))]
unsafe fn errno_location() -> *mut libc::c_int {
    unsafe { libc::__errno() }
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "tvos",
    target_os = "watchos",
    target_os = "freebsd"
))]
unsafe fn errno_location() -> *mut libc::c_int {
    unsafe { libc::__error() }
}

#[cfg(target_os = "dragonfly")]
unsafe fn errno_location() -> *mut libc::c_int {
    unsafe { libc::__dfly_error() }
}

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
unsafe fn errno_location() -> *mut libc::c_int {
    unsafe { libc::___errno() }
}

/// Async-signal-safe: a thread-local read.
pub(crate) fn errno() -> libc::c_int {
    unsafe { *errno_location() }
}

/// Async-signal-safe: a thread-local write.
pub(crate) fn set_errno(value: libc::c_int) {
    unsafe { *errno_location() = value }
}

// =========================================================================
// Signal channel primitives
// =========================================================================

/// Creates a blocking pipe, both ends close-on-exec. Returns `(read, write)`.
pub(crate) fn pipe() -> DaemonResult<(OwnedFd, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [0; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(DaemonError::last_os_error("pipe"));
    }
    // Owned from here on, so an fcntl failure below still closes both ends.
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    set_cloexec(fds[0])?;
    set_cloexec(fds[1])?;
    Ok((read, write))
}

fn set_cloexec(fd: RawFd) -> DaemonResult<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 || unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(DaemonError::last_os_error("fcntl"));
    }
    Ok(())
}

/// Writes one signal identifier with a single `write(2)`.
///
/// Async-signal-safe. Returns `false` unless the whole identifier went out in one call.
pub(crate) fn write_signal(fd: RawFd, value: libc::c_int) -> bool {
    let len = mem::size_of::<libc::c_int>();
    let written = unsafe { libc::write(fd, (&value as *const libc::c_int).cast(), len) };
    written == len as libc::ssize_t
}

// =========================================================================
// Signal dispositions
// =========================================================================

/// Installs `handler` for `signum` with `SA_RESTART`, returning the disposition it replaced.
pub(crate) fn install_handler(
    signum: libc::c_int,
    handler: extern "C" fn(libc::c_int),
) -> DaemonResult<libc::sigaction> {
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handler as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);

        let mut previous: libc::sigaction = mem::zeroed();
        if libc::sigaction(signum, &action, &mut previous) < 0 {
            return Err(DaemonError::last_os_error("sigaction"));
        }
        Ok(previous)
    }
}

pub(crate) fn restore_handler(signum: libc::c_int, previous: &libc::sigaction) -> DaemonResult<()> {
    if unsafe { libc::sigaction(signum, previous, ptr::null_mut()) } < 0 {
        return Err(DaemonError::last_os_error("sigaction"));
    }
    Ok(())
}

/// The raw handler currently installed for `signum`.
#[cfg(test)]
pub(crate) fn current_handler(signum: libc::c_int) -> libc::sighandler_t {
    unsafe {
        let mut current: libc::sigaction = mem::zeroed();
        libc::sigaction(signum, ptr::null(), &mut current);
        current.sa_sigaction
    }
}

// =========================================================================
// Detaching
// =========================================================================

/// Platforms where `daemon(3)` is available and not deprecated.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub(crate) fn detach_native() -> DaemonResult<Detached> {
    // nochdir = 1: the working directory is kept on purpose.
    // noclose = 0: stdio is rebound to /dev/null.
    if unsafe { libc::daemon(1, 0) } < 0 {
        return Err(DaemonError::last_os_error("daemon"));
    }
    // The parent has already exited inside daemon(3).
    Ok(Detached::Child)
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
pub(crate) fn detach_native() -> DaemonResult<Detached> {
    detach_fork()
}

/// Single fork, new session, stdio to /dev/null. The working directory is not changed.
pub(crate) fn detach_fork() -> DaemonResult<Detached> {
    unsafe {
        if perform_fork()? > 0 {
            return Ok(Detached::Parent);
        }

        if libc::setsid() < 0 {
            return Err(DaemonError::last_os_error("setsid"));
        }

        redirect_stdio_to_devnull()?;
    }
    Ok(Detached::Child)
}

unsafe fn perform_fork() -> DaemonResult<libc::pid_t> {
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        Err(DaemonError::last_os_error("fork"))
    } else {
        Ok(pid)
    }
}

unsafe fn redirect_stdio_to_devnull() -> DaemonResult<()> {
    let fd = unsafe { libc::open(c"/dev/null".as_ptr(), libc::O_RDWR) };
    if fd < 0 {
        return Err(DaemonError::last_os_error("open"));
    }

    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if unsafe { libc::dup2(fd, target) } < 0 {
            let err = DaemonError::last_os_error("dup2");
            unsafe { libc::close(fd) };
            return Err(err);
        }
    }

    if fd > libc::STDERR_FILENO {
        unsafe { libc::close(fd) };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;

    #[test]
    fn errno_round_trips_on_this_thread() {
        let saved = errno();
        set_errno(libc::EINTR);
        assert_eq!(errno(), libc::EINTR);
        set_errno(saved);
    }

    #[test]
    fn pipe_ends_are_close_on_exec() {
        let (read, write) = pipe().expect("pipe");
        for fd in [read.as_raw_fd(), write.as_raw_fd()] {
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            assert_ne!(flags & libc::FD_CLOEXEC, 0);
        }
    }

    #[test]
    fn write_signal_reports_failure_on_bad_fd() {
        assert!(!write_signal(-1, libc::SIGTERM));
    }
}

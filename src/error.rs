use std::io;
use thiserror::Error;

/// Error type for sigforge.
/// Every variant is a setup failure: nothing here is produced once the workload is running.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// An OS primitive (pipe, sigaction, fork, setsid, daemon, dup2...) failed.
    #[error("{call}() failed ({errno}): {}", os_reason(.errno))]
    Syscall { call: &'static str, errno: i32 },
    /// The dispatch thread could not be spawned.
    #[error("failed to spawn signal dispatch thread: {0}")]
    Thread(#[source] io::Error),
    /// Another lifecycle is already active in this process.
    #[error("a daemon lifecycle is already running in this process")]
    AlreadyRunning,
    /// The platform has no way to provide the requested behavior.
    #[error("unsupported on this platform: {0}")]
    Unsupported(&'static str),
}

impl DaemonError {
    /// Builds a [`DaemonError::Syscall`] from the calling thread's current `errno`.
    pub(crate) fn last_os_error(call: &'static str) -> Self {
        DaemonError::Syscall {
            call,
            errno: io::Error::last_os_error().raw_os_error().unwrap_or(0),
        }
    }

    /// The originating OS error code, when there is one.
    pub fn errno(&self) -> Option<i32> {
        match self {
            DaemonError::Syscall { errno, .. } => Some(*errno),
            DaemonError::Thread(err) => err.raw_os_error(),
            DaemonError::AlreadyRunning | DaemonError::Unsupported(_) => None,
        }
    }
}

fn os_reason(errno: &i32) -> io::Error {
    io::Error::from_raw_os_error(*errno)
}

/// A specialized Result type for sigforge operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_error_names_the_call_and_code() {
        let err = DaemonError::Syscall { call: "pipe", errno: 24 };
        let msg = err.to_string();
        assert!(msg.starts_with("pipe() failed (24): "), "{msg}");
        assert_eq!(err.errno(), Some(24));
    }

    #[test]
    fn guard_errors_carry_no_errno() {
        assert_eq!(DaemonError::AlreadyRunning.errno(), None);
        assert_eq!(DaemonError::Unsupported("detach").errno(), None);
    }

    #[cfg(unix)]
    #[test]
    fn os_failures_become_syscall_errors() {
        assert_eq!(unsafe { libc::close(-1) }, -1);
        let err = DaemonError::last_os_error("close");
        assert!(matches!(err, DaemonError::Syscall { call: "close", .. }));
        assert_eq!(err.errno(), Some(libc::EBADF));
    }

    #[test]
    fn thread_error_exposes_source() {
        use std::error::Error as _;
        let err = DaemonError::Thread(io::Error::from_raw_os_error(11));
        assert_eq!(err.errno(), Some(11));
        assert!(err.source().is_some());
    }
}

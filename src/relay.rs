//! Signal relay: the only code that runs in signal context.
//!
//! The installed handler does one thing: write the signal number into the signal channel.
//! Everything else happens on the dispatch thread.

use crate::error::DaemonResult;
use crate::state;
use crate::sys;
use crate::types::Signal;

/// Handler installed for every relayed signal.
///
/// Restricted to async-signal-safe operations: an atomic load, one `write(2)`, and the errno
/// save/restore around it. A failed write aborts, as a dropped stop or reconfigure request is
/// worse than a crash. With no channel published the run is over and the signal is dropped.
extern "C" fn relay_signal(signum: libc::c_int) {
    let fd = state::signal_fd();
    if fd < 0 {
        return;
    }
    let saved_errno = sys::errno();
    if !sys::write_signal(fd, signum) {
        unsafe { libc::abort() };
    }
    sys::set_errno(saved_errno);
}

/// One installed handler. Dropping it puts the previous disposition back.
pub(crate) struct InstalledHandler {
    signum: libc::c_int,
    previous: libc::sigaction,
}

impl InstalledHandler {
    pub(crate) fn install(signum: libc::c_int) -> DaemonResult<Self> {
        let previous = sys::install_handler(signum, relay_signal)?;
        tracing::debug!(signal = signal_name(signum), "signal relay installed");
        Ok(InstalledHandler { signum, previous })
    }
}

impl Drop for InstalledHandler {
    fn drop(&mut self) {
        if let Err(err) = sys::restore_handler(self.signum, &self.previous) {
            tracing::warn!(signal = signal_name(self.signum), error = %err, "failed to restore signal disposition");
        }
    }
}

fn signal_name(signum: libc::c_int) -> &'static str {
    Signal::from_raw(signum).map_or("unhandled signal", Signal::name)
}

/// Installed relay handlers, restored in reverse order on drop.
pub(crate) struct RelaySet {
    handlers: Vec<InstalledHandler>,
}

impl RelaySet {
    /// Installs HUP, INT and TERM.
    pub(crate) fn install_all() -> DaemonResult<Self> {
        Self::install_each(Signal::HANDLED.map(Signal::as_raw))
    }

    /// If one installation fails, the ones already installed are restored before the error
    /// is returned.
    pub(crate) fn install_each<I>(signums: I) -> DaemonResult<Self>
    where
        I: IntoIterator<Item = libc::c_int>,
    {
        let mut set = RelaySet { handlers: Vec::new() };
        for signum in signums {
            set.handlers.push(InstalledHandler::install(signum)?);
        }
        Ok(set)
    }
}

impl Drop for RelaySet {
    fn drop(&mut self) {
        while let Some(handler) = self.handlers.pop() {
            drop(handler);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_all_replaces_and_restores_dispositions() {
        let _serial = state::serial_test_lock();
        let ours = relay_signal as libc::sighandler_t;
        let before: Vec<_> = Signal::HANDLED.iter().map(|s| sys::current_handler(s.as_raw())).collect();

        let set = RelaySet::install_all().expect("install relays");
        for signal in Signal::HANDLED {
            assert_eq!(sys::current_handler(signal.as_raw()), ours, "{}", signal.name());
        }

        drop(set);
        let after: Vec<_> = Signal::HANDLED.iter().map(|s| sys::current_handler(s.as_raw())).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn failed_install_restores_handlers_already_installed() {
        let _serial = state::serial_test_lock();
        let before = sys::current_handler(libc::SIGHUP);

        // -1 is never a valid signal number: sigaction fails with EINVAL.
        let err = match RelaySet::install_each([libc::SIGHUP, -1]) {
            Ok(_) => panic!("installing an invalid signal must fail"),
            Err(err) => err,
        };

        assert!(matches!(err, crate::DaemonError::Syscall { call: "sigaction", .. }));
        assert_eq!(err.errno(), Some(libc::EINVAL));
        assert_eq!(sys::current_handler(libc::SIGHUP), before);
    }

    #[test]
    fn signal_after_teardown_is_dropped() {
        let _serial = state::serial_test_lock();
        assert_eq!(state::signal_fd(), -1);

        sys::set_errno(libc::EAGAIN);
        relay_signal(libc::SIGHUP);

        assert_eq!(sys::errno(), libc::EAGAIN);
    }
}

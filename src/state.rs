//! Process-wide lifecycle state.
//!
//! A signal handler receives nothing but the signal number, so the one thing it needs (the
//! write end of the signal channel) has to live at process scope. This module is that single
//! singleton. It is initialized by [`ActiveGuard::acquire`] at the top of a lifecycle run and
//! torn down when the guard drops, which also enforces that only one lifecycle is active.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};

use crate::error::{DaemonError, DaemonResult};
use crate::types::Phase;

static ACTIVE: AtomicBool = AtomicBool::new(false);
static PHASE: AtomicU8 = AtomicU8::new(0);
static SIGNAL_WRITE_FD: AtomicI32 = AtomicI32::new(NO_FD);

const NO_FD: i32 = -1;

/// Proof that the calling lifecycle owns the process-wide state.
#[derive(Debug)]
pub(crate) struct ActiveGuard {
    _owned: (),
}

impl ActiveGuard {
    /// Claims the singleton. Fails without touching any state when another lifecycle holds it.
    pub(crate) fn acquire() -> DaemonResult<Self> {
        ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DaemonError::AlreadyRunning)?;
        set_phase(Phase::Init);
        Ok(ActiveGuard { _owned: () })
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        // A run that unwound out of the lifecycle still ends in a terminal phase.
        match phase() {
            Phase::Init | Phase::Daemonizing | Phase::InstallingSignals => set_phase(Phase::FailedSetup),
            Phase::Running | Phase::TearingDown => set_phase(Phase::Terminated),
            Phase::Terminated | Phase::FailedSetup => {}
        }
        SIGNAL_WRITE_FD.store(NO_FD, Ordering::SeqCst);
        ACTIVE.store(false, Ordering::Release);
    }
}

/// Current lifecycle phase of this process.
///
/// After a run completes this keeps reporting how it ended (`Terminated` or `FailedSetup`)
/// until the next run starts.
pub fn phase() -> Phase {
    Phase::from_u8(PHASE.load(Ordering::Acquire))
}

pub(crate) fn set_phase(phase: Phase) {
    let previous = Phase::from_u8(PHASE.swap(phase.as_u8(), Ordering::AcqRel));
    tracing::debug!(from = ?previous, to = ?phase, "lifecycle phase changed");
}

#[cfg(unix)]
pub(crate) fn publish_signal_fd(fd: std::os::fd::RawFd) {
    SIGNAL_WRITE_FD.store(fd, Ordering::SeqCst);
}

#[cfg(unix)]
pub(crate) fn clear_signal_fd() {
    SIGNAL_WRITE_FD.store(NO_FD, Ordering::SeqCst);
}

/// Read from signal context: a single atomic load, nothing else.
#[cfg(unix)]
pub(crate) fn signal_fd() -> std::os::fd::RawFd {
    SIGNAL_WRITE_FD.load(Ordering::SeqCst)
}

/// Serializes unit tests that touch process-wide state: the guard, signal dispositions, the
/// published fd.
#[cfg(test)]
pub(crate) fn serial_test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_guard_is_refused_until_first_drops() {
        let _serial = serial_test_lock();
        let first = ActiveGuard::acquire().expect("first acquire");
        assert!(matches!(ActiveGuard::acquire(), Err(DaemonError::AlreadyRunning)));
        drop(first);
        let again = ActiveGuard::acquire().expect("reacquire after drop");
        assert_eq!(phase(), Phase::Init);
        drop(again);
    }

    #[test]
    fn dropped_guard_leaves_a_terminal_phase() {
        let _serial = serial_test_lock();

        let guard = ActiveGuard::acquire().expect("acquire");
        set_phase(Phase::Running);
        drop(guard);
        assert_eq!(phase(), Phase::Terminated);

        let guard = ActiveGuard::acquire().expect("acquire");
        set_phase(Phase::InstallingSignals);
        drop(guard);
        assert_eq!(phase(), Phase::FailedSetup);
    }
}

// =========================================================================
// Signals
// =========================================================================

#[cfg(unix)]
pub use unix_signal::Signal;

#[cfg(unix)]
mod unix_signal {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};

    /// A signal the lifecycle relays to the daemon.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Signal {
        /// `SIGHUP`, mapped to [`Daemon::reconfigure`](crate::Daemon::reconfigure).
        Hangup,
        /// `SIGINT`, mapped to [`Daemon::stop`](crate::Daemon::stop).
        Interrupt,
        /// `SIGTERM`, mapped to [`Daemon::stop`](crate::Daemon::stop).
        Terminate,
    }

    impl Signal {
        /// Every signal the relay installs a handler for, in installation order.
        pub const HANDLED: [Signal; 3] = [Signal::Hangup, Signal::Interrupt, Signal::Terminate];

        /// The OS signal number.
        pub fn as_raw(self) -> i32 {
            match self {
                Signal::Hangup => SIGHUP,
                Signal::Interrupt => SIGINT,
                Signal::Terminate => SIGTERM,
            }
        }

        /// Maps an OS signal number back to a handled signal.
        pub fn from_raw(raw: i32) -> Option<Self> {
            match raw {
                SIGHUP => Some(Signal::Hangup),
                SIGINT => Some(Signal::Interrupt),
                SIGTERM => Some(Signal::Terminate),
                _ => None,
            }
        }

        /// The conventional name, e.g. `"SIGHUP"`.
        pub fn name(self) -> &'static str {
            match self {
                Signal::Hangup => "SIGHUP",
                Signal::Interrupt => "SIGINT",
                Signal::Terminate => "SIGTERM",
            }
        }
    }
}

// =========================================================================
// Lifecycle phases and outcome
// =========================================================================

/// Where the process-wide lifecycle currently stands.
///
/// `Init -> [Daemonizing] -> InstallingSignals -> Running -> TearingDown -> Terminated`,
/// with `FailedSetup` reachable from `Daemonizing` and `InstallingSignals`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Daemonizing,
    InstallingSignals,
    /// The only phase in which `stop` and `reconfigure` may fire.
    Running,
    TearingDown,
    Terminated,
    FailedSetup,
}

impl Phase {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Phase::Init => 0,
            Phase::Daemonizing => 1,
            Phase::InstallingSignals => 2,
            Phase::Running => 3,
            Phase::TearingDown => 4,
            Phase::Terminated => 5,
            Phase::FailedSetup => 6,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Phase::Daemonizing,
            2 => Phase::InstallingSignals,
            3 => Phase::Running,
            4 => Phase::TearingDown,
            5 => Phase::Terminated,
            6 => Phase::FailedSetup,
            _ => Phase::Init,
        }
    }
}

/// Successful result of a lifecycle run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// This process was the parent of a fork-based detach. The daemon now lives in the child
    /// and this process is expected to exit.
    Detached,
    /// The workload ran and `start` returned this exit code.
    Finished { exit_code: i32 },
}

impl Outcome {
    /// The exit code the process should terminate with. `Detached` maps to the neutral `0`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Detached => 0,
            Outcome::Finished { exit_code } => *exit_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn handled_signals_map_back_from_raw() {
        for signal in Signal::HANDLED {
            assert_eq!(Signal::from_raw(signal.as_raw()), Some(signal));
        }
        assert_eq!(Signal::from_raw(0), None);
        assert_eq!(Signal::from_raw(libc::SIGUSR1), None);
        assert_eq!(Signal::Hangup.name(), "SIGHUP");
    }

    #[test]
    fn phase_survives_atomic_storage() {
        let phases = [
            Phase::Init,
            Phase::Daemonizing,
            Phase::InstallingSignals,
            Phase::Running,
            Phase::TearingDown,
            Phase::Terminated,
            Phase::FailedSetup,
        ];
        for phase in phases {
            assert_eq!(Phase::from_u8(phase.as_u8()), phase);
        }
    }

    #[test]
    fn detached_outcome_is_neutral() {
        assert_eq!(Outcome::Detached.exit_code(), 0);
        assert_eq!(Outcome::Finished { exit_code: 3 }.exit_code(), 3);
    }
}

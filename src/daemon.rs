use std::fmt;

use crate::detach::{Detach, Detached, NativeDetach};
use crate::error::DaemonResult;
use crate::state::{self, ActiveGuard};
use crate::types::{Outcome, Phase};

/// The workload driven by the lifecycle.
///
/// `start` runs on the calling thread for the daemon's whole operational life. `stop` and
/// `reconfigure` run on the dispatch thread, one at a time, possibly while `start` is still
/// running, hence the `Sync` bound.
pub trait Daemon: Sync {
    /// Runs the workload and returns the process exit code. Called exactly once per run.
    ///
    /// Shutdown is cooperative: `start` should return once it observes what `stop` did.
    fn start(&self, foreground: bool) -> i32;

    /// SIGINT or SIGTERM was received. May be called any number of times.
    fn stop(&self);

    /// SIGHUP was received. May be called any number of times.
    fn reconfigure(&self);
}

/// Runs `daemon` through a full lifecycle with default settings.
///
/// Shorthand for `Lifecycle::new().foreground(foreground).run(daemon)`.
pub fn run_daemon<D: Daemon + ?Sized>(daemon: &D, foreground: bool) -> DaemonResult<Outcome> {
    Lifecycle::new().foreground(foreground).run(daemon)
}

/// Configures and runs one daemon lifecycle.
pub struct Lifecycle {
    foreground: bool,
    notify_systemd: bool,
    detacher: Box<dyn Detach>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("foreground", &self.foreground)
            .field("notify_systemd", &self.notify_systemd)
            .field("detacher", &"Box<dyn Detach>")
            .finish()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Creates a new default configuration.
    ///
    /// # Defaults
    /// - Background mode (detaches before starting)
    /// - Detacher: [`NativeDetach`]
    /// - Systemd notification: off
    pub fn new() -> Self {
        Lifecycle {
            foreground: false,
            notify_systemd: false,
            detacher: Box::new(NativeDetach),
        }
    }

    /// Returns whether the lifecycle stays attached to the terminal.
    pub fn is_foreground(&self) -> bool {
        self.foreground
    }

    /// If `true`, stays attached to the terminal and never calls the detacher.
    pub fn foreground(mut self, foreground: bool) -> Self {
        self.foreground = foreground;
        self
    }

    /// Replaces the detach strategy used in background mode.
    pub fn detacher<T: Detach + 'static>(mut self, detacher: T) -> Self {
        self.detacher = Box::new(detacher);
        self
    }

    /// (Linux) Sends `READY=1` once signals are relayed and `STOPPING=1` when `start` returns,
    /// if the process runs under systemd (`NOTIFY_SOCKET` is set). A no-op elsewhere.
    pub fn notify_systemd(mut self, notify: bool) -> Self {
        self.notify_systemd = notify;
        self
    }

    /// Runs the lifecycle: detach, relay signals, run `start`, tear down.
    ///
    /// Returns [`Outcome::Detached`] without running anything when this process turned out to
    /// be the parent of a fork-based detach. Setup failures are returned before `start` is
    /// ever called, with everything created so far already released.
    pub fn run<D: Daemon + ?Sized>(&self, daemon: &D) -> DaemonResult<Outcome> {
        let _active = ActiveGuard::acquire()?;

        if !self.is_foreground() {
            state::set_phase(Phase::Daemonizing);
            match self.detacher.detach() {
                Ok(Detached::Parent) => {
                    state::set_phase(Phase::Terminated);
                    tracing::info!("daemon detached into child process; parent is done");
                    return Ok(Outcome::Detached);
                }
                Ok(Detached::Child) => {
                    tracing::info!(pid = std::process::id(), "running detached");
                }
                Err(err) => {
                    state::set_phase(Phase::FailedSetup);
                    return Err(err);
                }
            }
        }

        let exit_code = self.supervise(daemon)?;
        state::set_phase(Phase::Terminated);
        tracing::info!(exit_code, "daemon lifecycle finished");
        Ok(Outcome::Finished { exit_code })
    }

    #[cfg(unix)]
    fn supervise<D: Daemon + ?Sized>(&self, daemon: &D) -> DaemonResult<i32> {
        std::thread::scope(|scope| {
            state::set_phase(Phase::InstallingSignals);
            let session = match session::Session::open(scope, daemon) {
                Ok(session) => session,
                Err(err) => {
                    state::set_phase(Phase::FailedSetup);
                    return Err(err);
                }
            };

            state::set_phase(Phase::Running);
            self.notify(session::Readiness::Ready);
            let exit_code = daemon.start(self.foreground);

            state::set_phase(Phase::TearingDown);
            self.notify(session::Readiness::Stopping);
            let dispatched = session.close();
            tracing::debug!(dispatched, "signal dispatch finished");
            Ok(exit_code)
        })
    }

    #[cfg(not(unix))]
    fn supervise<D: Daemon + ?Sized>(&self, _daemon: &D) -> DaemonResult<i32> {
        state::set_phase(Phase::FailedSetup);
        Err(crate::error::DaemonError::Unsupported("signal relay"))
    }

    #[cfg(target_os = "linux")]
    fn notify(&self, readiness: session::Readiness) {
        use sd_notify::NotifyState;

        if !self.notify_systemd || std::env::var_os("NOTIFY_SOCKET").is_none() {
            return;
        }
        let notice = match readiness {
            session::Readiness::Ready => NotifyState::Ready,
            session::Readiness::Stopping => NotifyState::Stopping,
        };
        // Keep NOTIFY_SOCKET set: STOPPING=1 still has to go out later.
        if let Err(err) = sd_notify::notify(false, &[notice]) {
            tracing::warn!(error = %err, "systemd notification failed");
        }
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn notify(&self, _readiness: session::Readiness) {}
}

#[cfg(unix)]
mod session {
    use std::os::fd::AsRawFd;
    use std::panic;
    use std::process;
    use std::thread::{self, Scope};

    use super::Daemon;
    use crate::channel::{SignalChannel, SignalWriter};
    use crate::dispatch::Dispatcher;
    use crate::error::DaemonResult;
    use crate::relay::RelaySet;
    use crate::state;

    pub(super) enum Readiness {
        Ready,
        Stopping,
    }

    /// Everything that exists while signals are being relayed, torn down in reverse order of
    /// creation: dispositions restored, sentinel sent, dispatch thread joined, channel closed.
    ///
    /// Teardown runs on drop too, so a failed setup step or a panicking `start` still
    /// releases it all.
    pub(super) struct Session<'scope> {
        writer: SignalWriter,
        dispatcher: Option<Dispatcher<'scope>>,
        relays: Option<RelaySet>,
    }

    impl<'scope> Session<'scope> {
        pub(super) fn open<'env, D>(
            scope: &'scope Scope<'scope, 'env>,
            daemon: &'env D,
        ) -> DaemonResult<Self>
        where
            D: Daemon + ?Sized,
        {
            Self::open_with(scope, daemon, RelaySet::install_all)
        }

        fn open_with<'env, D, I>(
            scope: &'scope Scope<'scope, 'env>,
            daemon: &'env D,
            install: I,
        ) -> DaemonResult<Self>
        where
            D: Daemon + ?Sized,
            I: FnOnce() -> DaemonResult<RelaySet>,
        {
            let (reader, writer) = SignalChannel::open()?.split();
            state::publish_signal_fd(writer.as_raw_fd());

            let mut session = Session { writer, dispatcher: None, relays: None };
            session.dispatcher = Some(Dispatcher::spawn(scope, reader, daemon)?);
            session.relays = Some(install()?);
            Ok(session)
        }

        /// Tears down and returns how many callbacks the dispatch thread ran.
        ///
        /// A panic raised by `stop` or `reconfigure` resurfaces here, after teardown.
        pub(super) fn close(mut self) -> usize {
            self.shutdown()
        }

        fn shutdown(&mut self) -> usize {
            // Relays are restored first, the fd is unpublished after the join, and the write end
            // closes last, when the session drops. A handler still in flight on another thread
            // that loads the fd after `clear_signal_fd` sees -1 and drops the signal.
            drop(self.relays.take());

            let mut dispatched = 0;
            if let Some(dispatcher) = self.dispatcher.take() {
                if let Err(err) = self.writer.send_sentinel() {
                    // Joining without the sentinel would block forever.
                    tracing::error!(error = %err, "failed to send dispatch sentinel");
                    process::abort();
                }
                match dispatcher.join() {
                    Ok(report) => {
                        dispatched = report.dispatched;
                        if let Some(payload) = report.panic {
                            if thread::panicking() {
                                tracing::error!("signal callback panicked during an unwinding teardown");
                            } else {
                                panic::resume_unwind(payload);
                            }
                        }
                    }
                    Err(_) => tracing::error!("signal dispatch thread panicked"),
                }
            }

            state::clear_signal_fd();
            dispatched
        }
    }

    impl Drop for Session<'_> {
        fn drop(&mut self) {
            self.shutdown();
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_background() {
        assert!(!Lifecycle::new().is_foreground());
        assert!(!Lifecycle::default().is_foreground());
        assert!(Lifecycle::new().foreground(true).is_foreground());
    }
}

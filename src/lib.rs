//! # sigforge
//!
//! **sigforge** runs a long-lived workload as a daemon and turns asynchronous Unix signals into
//! ordinary, serialized callback invocations.
//!
//! A lifecycle run optionally detaches the process from its terminal, installs handlers for
//! `SIGHUP`, `SIGINT` and `SIGTERM` that do nothing but write the signal number into a pipe (the
//! self-pipe trick), and starts a dedicated dispatch thread that reads the pipe and calls
//! [`Daemon::stop`] or [`Daemon::reconfigure`]. The workload itself runs in [`Daemon::start`] on
//! the calling thread. When `start` returns, everything is torn down in reverse order.
//!
//! Only one lifecycle may be active per process.
//!
//! ```no_run
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use sigforge::{Daemon, run_daemon};
//!
//! struct Worker {
//!     stopping: AtomicBool,
//! }
//!
//! impl Daemon for Worker {
//!     fn start(&self, _foreground: bool) -> i32 {
//!         while !self.stopping.load(Ordering::Acquire) {
//!             std::thread::sleep(std::time::Duration::from_millis(100));
//!         }
//!         0
//!     }
//!     fn stop(&self) {
//!         self.stopping.store(true, Ordering::Release);
//!     }
//!     fn reconfigure(&self) {}
//! }
//!
//! let worker = Worker { stopping: AtomicBool::new(false) };
//! let outcome = run_daemon(&worker, true).expect("lifecycle setup failed");
//! std::process::exit(outcome.exit_code());
//! ```

#[cfg(unix)]
mod channel;
mod daemon;
mod detach;
#[cfg(unix)]
mod dispatch;
mod error;
#[cfg(unix)]
mod relay;
mod state;
mod sys;
mod types;

pub use daemon::{Daemon, Lifecycle, run_daemon};
pub use detach::{Detach, Detached, ForkDetach, NativeDetach};
pub use error::{DaemonError, DaemonResult};
pub use state::phase;
#[cfg(unix)]
pub use types::Signal;
pub use types::{Outcome, Phase};

//! Dispatch thread: turns queued signal identifiers into ordinary callback invocations.

use std::fs::File;
use std::io::Read;
use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::thread::{self, Scope, ScopedJoinHandle};

use crate::channel::SENTINEL;
use crate::daemon::Daemon;
use crate::error::{DaemonError, DaemonResult};
use crate::types::Signal;

pub(crate) const THREAD_NAME: &str = "signal-dispatch";

/// What the dispatch loop did before it exited.
pub(crate) struct DispatchReport {
    pub(crate) dispatched: usize,
    /// The first panic raised by a callback. Later callbacks still ran.
    pub(crate) panic: Option<Box<dyn Any + Send + 'static>>,
}

/// Drains `reader` until the sentinel, invoking callbacks one at a time.
///
/// A panicking callback does not end the loop: the read end has to stay open until the
/// sentinel, or the next relayed write would fail and abort. An identifier that was never
/// registered is a contract violation and aborts the process.
pub(crate) fn run_loop<R, D>(mut reader: R, daemon: &D) -> DispatchReport
where
    R: Read,
    D: Daemon + ?Sized,
{
    let mut report = DispatchReport { dispatched: 0, panic: None };
    let mut buf = [0u8; mem::size_of::<libc::c_int>()];

    loop {
        // read_exact retries on EINTR.
        if let Err(err) = reader.read_exact(&mut buf) {
            tracing::warn!(error = %err, "signal channel closed without sentinel");
            break;
        }

        let value = libc::c_int::from_ne_bytes(buf);
        if value == SENTINEL {
            break;
        }

        let Some(signal) = Signal::from_raw(value) else {
            tracing::error!(value, "unregistered identifier on signal channel");
            process::abort();
        };

        tracing::debug!(signal = signal.name(), "dispatching signal");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match signal {
            Signal::Hangup => daemon.reconfigure(),
            Signal::Interrupt | Signal::Terminate => daemon.stop(),
        }));
        report.dispatched += 1;

        if let Err(payload) = outcome {
            tracing::error!(signal = signal.name(), "signal callback panicked");
            if report.panic.is_none() {
                report.panic = Some(payload);
            }
        }
    }

    report
}

/// Handle to the running dispatch thread. Bounded by the lifecycle's thread scope.
pub(crate) struct Dispatcher<'scope> {
    handle: ScopedJoinHandle<'scope, DispatchReport>,
}

impl<'scope> Dispatcher<'scope> {
    pub(crate) fn spawn<'env, D>(
        scope: &'scope Scope<'scope, 'env>,
        reader: File,
        daemon: &'env D,
    ) -> DaemonResult<Self>
    where
        D: Daemon + ?Sized,
    {
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_owned())
            .spawn_scoped(scope, move || run_loop(reader, daemon))
            .map_err(DaemonError::Thread)?;
        Ok(Dispatcher { handle })
    }

    /// Waits for the loop to exit. The caller must have sent the sentinel first.
    pub(crate) fn join(self) -> thread::Result<DispatchReport> {
        self.handle.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
    }

    impl Daemon for Recorder {
        fn start(&self, _foreground: bool) -> i32 {
            0
        }
        fn stop(&self) {
            self.calls.lock().unwrap().push("stop");
        }
        fn reconfigure(&self) {
            self.calls.lock().unwrap().push("reconfigure");
        }
    }

    fn frames(values: &[libc::c_int]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    #[test]
    fn dispatches_in_order_and_stops_at_sentinel() {
        let recorder = Recorder::default();
        let input = frames(&[libc::SIGTERM, libc::SIGHUP, SENTINEL, libc::SIGINT]);

        let report = run_loop(input.as_slice(), &recorder);

        assert_eq!(report.dispatched, 2);
        assert!(report.panic.is_none());
        assert_eq!(*recorder.calls.lock().unwrap(), ["stop", "reconfigure"]);
    }

    #[test]
    fn interrupt_maps_to_stop() {
        let recorder = Recorder::default();
        let input = frames(&[libc::SIGINT, SENTINEL]);
        assert_eq!(run_loop(input.as_slice(), &recorder).dispatched, 1);
        assert_eq!(*recorder.calls.lock().unwrap(), ["stop"]);
    }

    #[test]
    fn sentinel_alone_dispatches_nothing() {
        let recorder = Recorder::default();
        let input = frames(&[SENTINEL]);
        assert_eq!(run_loop(input.as_slice(), &recorder).dispatched, 0);
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn eof_or_partial_frame_ends_the_loop() {
        let recorder = Recorder::default();
        let mut input = frames(&[libc::SIGHUP]);
        input.push(0xff);
        assert_eq!(run_loop(input.as_slice(), &recorder).dispatched, 1);
        assert_eq!(*recorder.calls.lock().unwrap(), ["reconfigure"]);
    }

    #[test]
    fn spawned_thread_joins_on_sentinel() {
        use crate::channel::SignalChannel;

        let recorder = Recorder::default();
        let (reader, writer) = SignalChannel::open().expect("open").split();
        let dispatched = thread::scope(|scope| {
            let dispatcher = Dispatcher::spawn(scope, reader, &recorder).expect("spawn");
            assert!(crate::sys::write_signal(std::os::fd::AsRawFd::as_raw_fd(&writer), libc::SIGTERM));
            writer.send_sentinel().expect("sentinel");
            dispatcher.join().expect("join").dispatched
        });
        assert_eq!(dispatched, 1);
        assert_eq!(*recorder.calls.lock().unwrap(), ["stop"]);
    }

    struct PanickyStop {
        reconfigured: Mutex<usize>,
    }

    impl Daemon for PanickyStop {
        fn start(&self, _foreground: bool) -> i32 {
            0
        }
        fn stop(&self) {
            panic!("stop failed");
        }
        fn reconfigure(&self) {
            *self.reconfigured.lock().unwrap() += 1;
        }
    }

    #[test]
    fn panicking_callback_keeps_draining_until_sentinel() {
        let daemon = PanickyStop { reconfigured: Mutex::new(0) };
        let input = frames(&[libc::SIGTERM, libc::SIGHUP, libc::SIGINT, SENTINEL]);

        let report = run_loop(input.as_slice(), &daemon);

        assert_eq!(report.dispatched, 3);
        assert_eq!(*daemon.reconfigured.lock().unwrap(), 1);
        let payload = report.panic.expect("first panic kept");
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"stop failed"));
    }
}

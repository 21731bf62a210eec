use crate::error::DaemonResult;

/// Which side of a detach the current process ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detached {
    /// The launcher side of a fork. Its job is done and it should exit.
    Parent,
    /// The detached daemon process, which goes on to run the workload.
    Child,
}

/// Detaches the process from its controlling terminal and session.
///
/// This is the single seam the lifecycle uses for daemonizing, so whatever the platform does
/// underneath, the lifecycle only sees a [`Detached`] or a setup error.
pub trait Detach {
    fn detach(&self) -> DaemonResult<Detached>;
}

/// The platform's preferred detach.
///
/// - Linux and the BSDs: `daemon(3)`, keeping the working directory and rebinding stdio to
///   `/dev/null`. The parent exits inside the call, so this always reports [`Detached::Child`].
/// - Other Unix platforms (macOS): behaves as [`ForkDetach`].
/// - Non-Unix platforms: fails with [`DaemonError::Unsupported`](crate::DaemonError::Unsupported).
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeDetach;

impl Detach for NativeDetach {
    fn detach(&self) -> DaemonResult<Detached> {
        crate::sys::detach_native()
    }
}

/// Manual detach: `fork()`, then `setsid()` and stdio to `/dev/null` in the child.
///
/// Unlike `daemon(3)`, the parent is not exited: it gets [`Detached::Parent`] back and the
/// lifecycle returns [`Outcome::Detached`](crate::Outcome::Detached) to it.
/// The working directory is left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkDetach;

impl Detach for ForkDetach {
    fn detach(&self) -> DaemonResult<Detached> {
        crate::sys::detach_fork()
    }
}

impl<F> Detach for F
where
    F: Fn() -> DaemonResult<Detached>,
{
    fn detach(&self) -> DaemonResult<Detached> {
        self()
    }
}

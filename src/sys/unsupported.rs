//! Platforms without fork/setsid or POSIX signal dispositions.
//!
//! Detaching reports an explicit error here instead of quietly running in the foreground.

use crate::detach::Detached;
use crate::error::{DaemonError, DaemonResult};

pub(crate) fn detach_native() -> DaemonResult<Detached> {
    Err(DaemonError::Unsupported("detaching from the controlling terminal"))
}

pub(crate) fn detach_fork() -> DaemonResult<Detached> {
    Err(DaemonError::Unsupported("fork-based detach"))
}

//! The self-pipe carrying signal identifiers from signal context to the dispatch thread.

use std::fs::File;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use crate::error::{DaemonError, DaemonResult};
use crate::sys;

/// Reserved identifier asking the dispatch loop to exit. Never a real signal number.
pub(crate) const SENTINEL: libc::c_int = 0;

/// A fresh pipe, split once into its two ends.
pub(crate) struct SignalChannel {
    read: OwnedFd,
    write: OwnedFd,
}

impl SignalChannel {
    pub(crate) fn open() -> DaemonResult<Self> {
        let (read, write) = sys::pipe()?;
        Ok(SignalChannel { read, write })
    }

    /// The read end goes to the dispatch thread; the write end stays with the lifecycle.
    pub(crate) fn split(self) -> (File, SignalWriter) {
        (File::from(self.read), SignalWriter { fd: self.write })
    }
}

/// Write end of the channel. Closing it is the last step of teardown.
#[derive(Debug)]
pub(crate) struct SignalWriter {
    fd: OwnedFd,
}

impl SignalWriter {
    pub(crate) fn send_sentinel(&self) -> DaemonResult<()> {
        if sys::write_signal(self.fd.as_raw_fd(), SENTINEL) {
            Ok(())
        } else {
            Err(DaemonError::last_os_error("write"))
        }
    }
}

impl AsRawFd for SignalWriter {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::mem;

    #[test]
    fn sentinel_arrives_as_one_identifier() {
        let (mut reader, writer) = SignalChannel::open().expect("open").split();
        assert!(sys::write_signal(writer.as_raw_fd(), libc::SIGHUP));
        writer.send_sentinel().expect("sentinel");

        let mut buf = [0u8; mem::size_of::<libc::c_int>()];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(libc::c_int::from_ne_bytes(buf), libc::SIGHUP);
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(libc::c_int::from_ne_bytes(buf), SENTINEL);
    }

    #[test]
    fn reader_sees_eof_once_writer_closes() {
        let (mut reader, writer) = SignalChannel::open().expect("open").split();
        drop(writer);
        let mut rest = Vec::new();
        assert_eq!(reader.read_to_end(&mut rest).unwrap(), 0);
    }
}

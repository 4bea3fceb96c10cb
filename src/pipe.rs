use std::fs::File;
use std::io::Read;
use std::os::fd::FromRawFd;

use crate::Error;

/// One end-consumed-at-a-time pipe used purely as an ordering barrier.
///
/// Neither side ever writes a payload; the *close* of the writing end is the
/// signal. Calling [`Pipe::rx`] or [`Pipe::tx`] drops the unused end
/// immediately, so each process only ever retains the single descriptor it
/// needs.
pub(crate) struct Pipe {
    rx: File,
    tx: File,
}

impl Pipe {
    /// Consumes the pipe, keeping only the read end.
    pub fn rx(self) -> File {
        drop(self.tx);
        self.rx
    }

    /// Consumes the pipe, keeping only the write end.
    pub fn tx(self) -> File {
        drop(self.rx);
        self.tx
    }
}

pub(crate) fn new_pipe() -> Result<Pipe, Error> {
    let (rx, tx) = nix::unistd::pipe()?;
    Ok(Pipe {
        rx: unsafe { File::from_raw_fd(rx) },
        tx: unsafe { File::from_raw_fd(tx) },
    })
}

/// Blocks until the peer closes its end of the pipe.
///
/// A successful read of zero bytes is the EOF signal ("go"). Reading any
/// actual byte is a protocol violation: this channel never carries payload,
/// so seeing one means something unexpected wrote to the pipe.
pub(crate) fn wait_close(mut rx: impl Read) -> Result<(), Error> {
    let mut buf = [0u8; 1];
    match rx.read(&mut buf)? {
        0 => Ok(()),
        _ => Err("protocol violation: unexpected byte on synchronization pipe".into()),
    }
}

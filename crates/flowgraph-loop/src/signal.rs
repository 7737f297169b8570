use std::io;
use std::os::fd::{AsFd, BorrowedFd};

use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow, Signal};
use nix::sys::signalfd::{siginfo, SfdFlags, SignalFd as NixSignalFd};

/// A signalfd-backed source. The caller is expected to have already blocked
/// the relevant signals via `block()` before constructing the server's
/// `Loop` (standard signalfd discipline — otherwise the default disposition
/// races the fd read).
pub struct SignalSource(NixSignalFd);

impl SignalSource {
    pub fn new(signals: &[Signal]) -> io::Result<Self> {
        let mut mask = SigSet::empty();
        for sig in signals {
            mask.add(*sig);
        }
        let fd = NixSignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK)?;
        Ok(Self(fd))
    }

    /// Block `signals` on the calling thread so they're only delivered
    /// through the returned `SignalSource`'s fd, not asynchronously.
    pub fn block(signals: &[Signal]) -> io::Result<()> {
        let mut mask = SigSet::empty();
        for sig in signals {
            mask.add(*sig);
        }
        pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&mask), None)?;
        Ok(())
    }

    pub fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }

    /// Read the next pending signal, if any.
    pub fn read_signal(&mut self) -> io::Result<Option<siginfo>> {
        match self.0.read_signal() {
            Ok(info) => Ok(info),
            Err(e) => Err(e.into()),
        }
    }
}

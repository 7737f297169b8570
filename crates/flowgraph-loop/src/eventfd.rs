use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use nix::sys::eventfd::{EfdFlags, EventFd as NixEventFd};
use nix::unistd::{read, write};

/// A wakeup-counter fd. Used both for user-triggered wakeups (`add_event`'s
/// source) and internally by the per-node activation wakeup mechanism
/// described in spec §4.6.2 — a follower's "dedicated eventfd".
pub struct EventFd(NixEventFd);

impl EventFd {
    /// Create a non-blocking eventfd with an initial counter of zero.
    pub fn new() -> io::Result<Self> {
        Ok(Self(NixEventFd::from_value_and_flags(
            0,
            EfdFlags::EFD_NONBLOCK,
        )?))
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }

    pub fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }

    /// Increment the counter by `value`, waking any epoll waiter registered
    /// on this fd for readability.
    pub fn signal(&self, value: u64) -> io::Result<()> {
        write(self.0.as_fd(), &value.to_ne_bytes())?;
        Ok(())
    }

    /// Read and reset the counter. Per eventfd(2), a single 8-byte read
    /// always succeeds with the accumulated total when the counter is
    /// nonzero; returns `Ok(0)` on `EAGAIN` (nothing pending).
    pub fn read(&self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        match read(self.0.as_fd(), &mut buf) {
            Ok(8) => Ok(u64::from_ne_bytes(buf)),
            Ok(_) => Ok(0),
            Err(nix::errno::Errno::EAGAIN) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl AsFd for EventFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl From<EventFd> for OwnedFd {
    fn from(value: EventFd) -> Self {
        value.0.into()
    }
}

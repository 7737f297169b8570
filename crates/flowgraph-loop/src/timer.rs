use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::time::Duration;

use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use nix::unistd::read;

/// A timerfd-backed wakeup source (spec: the `Loop` capability's timer
/// sources, e.g. the driver node's clock tick in §4.6.2).
pub struct Timer(TimerFd);

impl Timer {
    pub fn new() -> io::Result<Self> {
        let fd = TimerFd::new(ClockId::CLOCK_MONOTONIC, TimerFlags::TFD_NONBLOCK)?;
        Ok(Self(fd))
    }

    /// Arm the timer to fire once after `delay`, then every `interval`
    /// thereafter. An `interval` of zero disarms periodic re-firing.
    pub fn arm(&self, delay: Duration, interval: Duration) -> io::Result<()> {
        let expiration = Expiration::IntervalDelayed(
            TimeSpec::from_duration(delay),
            TimeSpec::from_duration(interval),
        );
        self.0.set(expiration, TimerSetTimeFlags::empty())?;
        Ok(())
    }

    pub fn disarm(&self) -> io::Result<()> {
        self.0.unset()?;
        Ok(())
    }

    pub fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }

    /// Drain the expiration counter; returns the number of ticks that have
    /// elapsed since the last read (normally 1, >1 indicates a missed tick —
    /// the caller should treat that as a scheduling watchdog signal, spec §4.6.2).
    pub fn read_expirations(&self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        match read(self.0.as_fd(), &mut buf) {
            Ok(8) => Ok(u64::from_ne_bytes(buf)),
            Ok(_) => Ok(0),
            Err(nix::errno::Errno::EAGAIN) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

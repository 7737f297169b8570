use std::collections::HashMap;
use std::io;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::trace;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

/// Callback run when a registered fd becomes readable.
pub type FdCallback = Box<dyn FnMut() + 'static>;
/// Callback run once per iteration with no pending fd events; returns `true`
/// to stay registered, `false` to be removed.
pub type IdleCallback = Box<dyn FnMut() -> bool + 'static>;

/// The single-threaded cooperative reactor the spec calls the `Loop`
/// capability (§2, §5): sources are fd/timer/event/signal (all just fds
/// here — timer/event/signal are thin wrappers in sibling modules) plus
/// idle callbacks, dispatched from one `epoll_wait`. Only the thread that
/// owns a `Loop` may block in its `run`/`run_once` — every other thread
/// talks to it through `InvokeQueue`.
pub struct Loop {
    epoll: Epoll,
    sources: HashMap<RawFd, FdCallback>,
    idle: Vec<IdleCallback>,
}

fn duration_to_timeout(timeout: Option<Duration>) -> EpollTimeout {
    match timeout {
        None => EpollTimeout::NONE,
        Some(d) => {
            let ms = d.as_millis().min(i32::MAX as u128) as isize;
            EpollTimeout::try_from(ms).unwrap_or(EpollTimeout::NONE)
        }
    }
}

impl Loop {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            epoll: Epoll::new(EpollCreateFlags::empty())?,
            sources: HashMap::new(),
            idle: Vec::new(),
        })
    }

    /// Register `fd` for readability; `callback` runs whenever `epoll_wait`
    /// reports it ready. The fd must outlive the registration — callers keep
    /// the owning handle (EventFd/Timer/SignalSource/listener) alive
    /// themselves.
    pub fn add_fd<F>(&mut self, fd: &impl AsFd, callback: F) -> io::Result<()>
    where
        F: FnMut() + 'static,
    {
        let raw = fd.as_fd().as_raw_fd();
        let event = EpollEvent::new(EpollFlags::EPOLLIN, raw as u64);
        self.epoll.add(fd.as_fd(), event)?;
        self.sources.insert(raw, Box::new(callback));
        Ok(())
    }

    pub fn remove_fd(&mut self, fd: &impl AsFd) -> io::Result<()> {
        let raw = fd.as_fd().as_raw_fd();
        self.epoll.delete(fd.as_fd())?;
        self.sources.remove(&raw);
        Ok(())
    }

    /// Register a callback invoked once per loop iteration (after any fd
    /// dispatch), removed automatically once it returns `false`.
    pub fn add_idle<F>(&mut self, callback: F)
    where
        F: FnMut() -> bool + 'static,
    {
        self.idle.push(Box::new(callback));
    }

    /// Run one `epoll_wait` pass. `timeout = None` blocks until a source is
    /// ready; per spec §5 this is the main loop's only suspension point.
    /// Returns the number of fd sources dispatched.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        let mut events = [EpollEvent::empty(); 64];
        let n = self.epoll.wait(&mut events, duration_to_timeout(timeout))?;
        for event in &events[..n] {
            let raw = event.data() as RawFd;
            if let Some(cb) = self.sources.get_mut(&raw) {
                trace!("dispatching fd source {raw}");
                cb();
            }
        }
        self.idle.retain_mut(|cb| cb());
        Ok(n)
    }

    /// Run until `running` is cleared, blocking in `epoll_wait` between
    /// iterations.
    pub fn run(&mut self, running: &AtomicBool) -> io::Result<()> {
        while running.load(Ordering::Acquire) {
            self.run_once(None)?;
        }
        Ok(())
    }
}

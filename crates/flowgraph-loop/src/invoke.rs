use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::warn;

use crate::eventfd::EventFd;

/// A single deferred call, boxed so heterogeneous closures share a queue.
type Invocation = Box<dyn FnOnce() + Send + 'static>;

/// Cross-thread call queue into a `Loop` (spec §5: "the caller writes a
/// record into a ring buffer and wakes the target loop through an eventfd;
/// the record is run in the target loop's dispatch order").
///
/// Bounded so a stalled consumer can't grow this without limit from a
/// realtime producer thread (spec §9's "fixed-capacity ring buffers with
/// `-EAGAIN` on overflow").
pub struct InvokeQueue {
    capacity: usize,
    queue: Mutex<VecDeque<Invocation>>,
    wakeup: EventFd,
}

/// Mirrors the one realtime-safe failure mode callers must handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

impl InvokeQueue {
    pub fn new(capacity: usize) -> std::io::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            wakeup: EventFd::new()?,
        }))
    }

    pub fn wakeup_fd(&self) -> &EventFd {
        &self.wakeup
    }

    /// Enqueue `f` to run on the owning loop's thread. Returns `Err(QueueFull)`
    /// without blocking if the queue is at capacity — callers on a realtime
    /// thread must treat this the same as a syscall returning `EAGAIN`.
    pub fn invoke<F>(&self, f: F) -> Result<(), QueueFull>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut queue = self.queue.lock().unwrap();
            if queue.len() >= self.capacity {
                return Err(QueueFull);
            }
            queue.push_back(Box::new(f));
        }
        if self.wakeup.signal(1).is_err() {
            warn!("invoke queue wakeup eventfd write failed");
        }
        Ok(())
    }

    /// Drain and run every pending invocation, in enqueue order. Called from
    /// the owning loop's thread when its wakeup fd becomes readable.
    pub fn dispatch(&self) {
        let _ = self.wakeup.read();
        loop {
            let next = self.queue.lock().unwrap().pop_front();
            match next {
                Some(f) => f(),
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatch_runs_in_enqueue_order() {
        let q = InvokeQueue::new(8).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            q.invoke(move || order.lock().unwrap().push(i)).unwrap();
        }
        q.dispatch();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn overflow_returns_queue_full_without_blocking() {
        let q = InvokeQueue::new(1).unwrap();
        q.invoke(|| {}).unwrap();
        assert_eq!(q.invoke(|| {}), Err(QueueFull));
    }

    #[test]
    fn dispatch_after_overflow_then_retry_succeeds() {
        let q = InvokeQueue::new(1).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            q.invoke(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        assert_eq!(q.invoke(|| {}), Err(QueueFull));
        q.dispatch();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(q.invoke(|| {}).is_ok());
    }
}

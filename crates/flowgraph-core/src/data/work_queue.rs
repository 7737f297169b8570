use log::{trace, warn};

/// An opaque tag identifying the object a pending work item belongs to —
/// a Node, Link, or Global id, reinterpreted by the caller. The queue
/// itself never looks inside it beyond equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkObject(pub u64);

impl From<u32> for WorkObject {
    fn from(v: u32) -> Self {
        WorkObject(v as u64)
    }
}

/// The outcome handed to a completion callback.
#[derive(Debug, Clone)]
pub enum WorkResult {
    Ok,
    Err(String),
}

type Callback = Box<dyn FnOnce(WorkResult) + Send>;

struct PendingWork {
    object: WorkObject,
    sequence: u32,
    callback: Callback,
}

/// Cross-subsystem deferral producing a total order of single-threaded
/// completions (spec §4.2). Many `NodeImpl` operations return `Async(seq)`;
/// this is the one place that ties a sequence number back to a
/// continuation — callers should never build ad hoc callback chains
/// instead (spec §9's "Async create/destroy").
#[derive(Default)]
pub struct WorkQueue {
    pending: Vec<PendingWork>,
    next_sequence: u32,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            next_sequence: 0,
        }
    }

    /// Register `callback` against `object`. `sequence = None` means the
    /// caller doesn't yet know the eventual completion's sequence number
    /// (typical of a newly issued async node operation); the queue mints
    /// one and returns it so the caller can echo it back through
    /// `complete`. `sequence = Some(seq)` pends against an already-known
    /// sequence (e.g. a client's `sync` echo).
    pub fn add(&mut self, object: WorkObject, sequence: Option<u32>, callback: Callback) -> u32 {
        let sequence = sequence.unwrap_or_else(|| {
            let seq = self.next_sequence;
            self.next_sequence = self.next_sequence.wrapping_add(1);
            seq
        });
        trace!("work queue: pending object={:?} seq={sequence}", object);
        self.pending.push(PendingWork {
            object,
            sequence,
            callback,
        });
        sequence
    }

    /// Match and run the earliest pending work for `(object, sequence)`.
    /// The matched entry is removed before its callback runs, so the
    /// callback may safely re-enqueue. A completion with no matching
    /// pending work is silently dropped (spec §4.2).
    pub fn complete(&mut self, object: WorkObject, sequence: u32, result: WorkResult) {
        let pos = self
            .pending
            .iter()
            .position(|w| w.object == object && w.sequence == sequence);
        match pos {
            Some(i) => {
                let work = self.pending.remove(i);
                (work.callback)(result);
            }
            None => warn!("work queue: no pending work for object={:?} seq={sequence}", object),
        }
    }

    /// Remove pending work without running it. `id = None` cancels every
    /// pending entry for `object`; `id = Some(seq)` cancels just that one.
    pub fn cancel(&mut self, object: WorkObject, id: Option<u32>) {
        self.pending.retain(|w| {
            if w.object != object {
                return true;
            }
            match id {
                Some(seq) => w.sequence != seq,
                None => false,
            }
        });
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn complete_matches_object_and_sequence() {
        let mut q = WorkQueue::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        let seq = q.add(WorkObject(1), None, Box::new(move |_| ran2.store(true, Ordering::SeqCst)));
        q.complete(WorkObject(1), seq, WorkResult::Ok);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn completion_with_wrong_object_is_dropped_silently() {
        let mut q = WorkQueue::new();
        let seq = q.add(WorkObject(1), None, Box::new(|_| panic!("should not run")));
        q.complete(WorkObject(2), seq, WorkResult::Ok);
        assert_eq!(q.pending_count(), 1);
    }

    #[test]
    fn cancel_removes_without_running() {
        let mut q = WorkQueue::new();
        let seq = q.add(WorkObject(1), None, Box::new(|_| panic!("should not run")));
        q.cancel(WorkObject(1), Some(seq));
        assert_eq!(q.pending_count(), 0);
    }

    #[test]
    fn cancel_with_no_id_clears_every_entry_for_object() {
        let mut q = WorkQueue::new();
        q.add(WorkObject(1), None, Box::new(|_| panic!("should not run")));
        q.add(WorkObject(1), None, Box::new(|_| panic!("should not run")));
        q.add(WorkObject(2), None, Box::new(|_| {}));
        q.cancel(WorkObject(1), None);
        assert_eq!(q.pending_count(), 1);
    }

    #[test]
    fn matched_entry_is_removed_before_callback_runs_so_reentrant_add_is_safe() {
        let mut q = WorkQueue::new();
        let seq = q.add(WorkObject(1), None, Box::new(|_| {}));
        // A callback is free to add more work without deadlocking or
        // observing its own now-removed entry.
        q.complete(WorkObject(1), seq, WorkResult::Ok);
        q.add(WorkObject(1), None, Box::new(|_| {}));
        assert_eq!(q.pending_count(), 1);
    }
}

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use flowgraph_loop::EventFd;

/// A Node's state within one cycle (spec §4.6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ActivationState {
    Inactive = 0,
    NotTriggered = 1,
    Triggered = 2,
    AwakeReady = 3,
    Finished = 4,
}

impl ActivationState {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => ActivationState::Inactive,
            1 => ActivationState::NotTriggered,
            2 => ActivationState::Triggered,
            3 => ActivationState::AwakeReady,
            _ => ActivationState::Finished,
        }
    }
}

/// The per-Node scheduling block (spec §4.6.2). Modeled as atomics rather
/// than a lock, the same choice `TripleBufferShared` makes for its state
/// word — the hot path may only use atomic fetch-sub/compare-exchange and
/// an eventfd wakeup (spec §5).
///
/// Real cross-process hosting would back this with a `MemBlock` mapping so
/// a client's own realtime thread can reach the same bytes; individual
/// Node hosting processes are out of scope here, so this stays in-process
/// and the struct is shared via `Arc` between the driver and whichever
/// thread runs the owning Node.
pub struct Activation {
    state: AtomicU32,
    pending: AtomicU32,
    required: AtomicU32,
    position: AtomicU64,
    signal_time: AtomicU64,
    awake_time: AtomicU64,
    finish_time: AtomicU64,
    prev_signal_time: AtomicU64,
    pub xrun_count: AtomicU32,
    pub wakeup: EventFd,
}

impl Activation {
    pub fn new() -> std::io::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            state: AtomicU32::new(ActivationState::Inactive as u32),
            pending: AtomicU32::new(0),
            required: AtomicU32::new(0),
            position: AtomicU64::new(0),
            signal_time: AtomicU64::new(0),
            awake_time: AtomicU64::new(0),
            finish_time: AtomicU64::new(0),
            prev_signal_time: AtomicU64::new(0),
            xrun_count: AtomicU32::new(0),
            wakeup: EventFd::new()?,
        }))
    }

    pub fn state(&self) -> ActivationState {
        ActivationState::from_u32(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ActivationState) {
        self.state.store(state as u32, Ordering::Release);
    }

    pub fn required(&self) -> u32 {
        self.required.load(Ordering::Acquire)
    }

    pub fn set_required(&self, n: u32) {
        self.required.store(n, Ordering::Release);
    }

    pub fn reset_pending(&self) {
        self.pending.store(self.required(), Ordering::Release);
    }

    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }

    /// Decrement `pending`, returning the post-decrement value. The caller
    /// signals the node's eventfd when this reaches zero (spec §4.6.2).
    pub fn decrement_pending(&self) -> u32 {
        self.pending.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn set_position(&self, cycle: u64) {
        self.position.store(cycle, Ordering::Release);
    }

    pub fn record_signal_time(&self, nsec: u64) {
        self.prev_signal_time
            .store(self.signal_time.load(Ordering::Acquire), Ordering::Release);
        self.signal_time.store(nsec, Ordering::Release);
    }

    pub fn record_awake_time(&self, nsec: u64) {
        self.awake_time.store(nsec, Ordering::Release);
    }

    pub fn record_finish_time(&self, nsec: u64) {
        self.finish_time.store(nsec, Ordering::Release);
    }

    pub fn signal_time(&self) -> u64 {
        self.signal_time.load(Ordering::Acquire)
    }

    pub fn awake_time(&self) -> u64 {
        self.awake_time.load(Ordering::Acquire)
    }

    pub fn finish_time(&self) -> u64 {
        self.finish_time.load(Ordering::Acquire)
    }

    pub fn prev_signal_time(&self) -> u64 {
        self.prev_signal_time.load(Ordering::Acquire)
    }

    pub fn record_xrun(&self) {
        self.xrun_count.fetch_add(1, Ordering::AcqRel);
    }
}

/// The `Clock` IO slot (spec §3.2, §4.6.2).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClockRecord {
    pub nsec: u64,
    pub position: u64,
    pub delay: i64,
    pub rate: f64,
}

/// The `Position` IO slot a driver writes at the start of every cycle
/// (spec §3.2, §4.6.2 step 1).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionRecord {
    pub clock: ClockRecord,
    pub cycle: u64,
    pub quantum: u32,
    pub rate: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_pending_copies_required() {
        let a = Activation::new().unwrap();
        a.set_required(3);
        a.reset_pending();
        assert_eq!(a.pending(), 3);
        assert_eq!(a.decrement_pending(), 2);
        assert_eq!(a.decrement_pending(), 1);
        assert_eq!(a.decrement_pending(), 0);
    }

    #[test]
    fn signal_time_tracks_previous() {
        let a = Activation::new().unwrap();
        a.record_signal_time(100);
        a.record_signal_time(200);
        assert_eq!(a.signal_time(), 200);
    }
}

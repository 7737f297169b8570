//! The `Loop` capability: a single-threaded reactor plus the primitives
//! built on top of it (timers, signalfd, eventfd, and a cross-thread
//! invoke queue). This crate exposes the capability set consumed by the
//! rest of the workspace — it does not know about graphs, nodes, or the
//! wire protocol.

mod eventfd;
mod invoke;
mod reactor;
mod signal;
mod timer;

pub use eventfd::EventFd;
pub use invoke::{InvokeQueue, QueueFull};
pub use reactor::Loop;
pub use signal::SignalSource;
pub use timer::Timer;

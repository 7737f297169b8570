//! Graph topology and per-object state machines (spec §4.4): the Node
//! processing-unit contract and the Port state machine.

pub mod node;
pub mod node_impl;
pub mod port;

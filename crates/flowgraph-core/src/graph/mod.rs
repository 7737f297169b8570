//! Scheduling: per-node Activation blocks, Links and their five-phase
//! negotiation, the driver/follower cycle engine, and rate matching
//! (spec §4.6).

pub mod activation;
pub mod engine;
pub mod link;
pub mod rate_match;

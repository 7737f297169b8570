//! The object registry and per-client permission-gated handles (spec §3.2,
//! §4.3): Globals, Clients, Resources, and the permission filter; plus the
//! work queue (§4.2) that serializes async completions.

pub mod client;
pub mod event;
pub mod global;
pub mod ids;
pub mod permission;
pub mod resource;
pub mod session;
pub mod work_queue;

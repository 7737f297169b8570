//! The flowgraph server core: the object registry and permission model
//! (spec §3.2, §4.3), the Node/Port/Link graph topology (spec §4.4), format
//! and buffer negotiation (spec §4.5), and the realtime scheduler (spec
//! §4.6). Message framing and the wire vocabulary live in `flowgraph-proto`;
//! this crate only knows about domain objects and `CoreEvent`s.

pub mod core;
pub mod data;
pub mod error;
pub mod factories;
pub mod graph;
pub mod negotiate;
pub mod node;

pub use core::Core;
pub use error::{CoreError, ErrorCode};

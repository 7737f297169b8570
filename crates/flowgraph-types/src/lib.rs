//! Value primitives consumed by the flowgraph core (spec §3.1): interned
//! `Id`s, free-form `Dict` properties, and the `Pod` tagged-value model that
//! format/buffer negotiation operates on.

pub mod dict;
pub mod id;
pub mod pod;

pub use dict::Dict;
pub use id::{Id, TypeMap};
pub use pod::{Choice, Pod};

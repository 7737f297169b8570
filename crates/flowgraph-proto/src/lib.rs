//! The client wire protocol (spec §6.1): message shapes and length-prefixed
//! framing over the Unix domain socket transport. Translating these to and
//! from `flowgraph-core`'s domain objects is `flowgraph-serverd`'s job; this
//! crate only knows about bytes and message shapes.

pub mod framing;
pub mod message;

pub use framing::{read_message, serialize_frame, write_message};
pub use message::{ClientMessage, GlobalId, LinkInfoPayload, MemType, NodeInfoPayload, ObjectRef, ResourceId, ServerMessage, WirePermissions};

//! Shared-memory block pool: allocate, import, map, and refcount the
//! memory that carries zero-copy buffers between nodes (spec §4.1, §3.2).

mod block;
mod error;
mod map;
mod pool;

pub use block::{AllocFlags, BlockType, MemBlock, SealState};
pub use error::{MemPoolError, Result};
pub use map::MemMap;
pub use pool::MemPool;

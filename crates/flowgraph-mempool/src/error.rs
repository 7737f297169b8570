use std::fmt;
use std::io;

/// Domain error codes for pool operations (spec §4.1's failure modes),
/// a plain enum rather than a `thiserror` derive to match the rest of the
/// workspace's hand-rolled error style.
#[derive(Debug)]
pub enum MemPoolError {
    OutOfMemory,
    NoSupport,
    BadArgument,
    Os(io::Error),
}

impl fmt::Display for MemPoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemPoolError::OutOfMemory => write!(f, "out of memory"),
            MemPoolError::NoSupport => write!(f, "unsupported block type"),
            MemPoolError::BadArgument => write!(f, "bad argument"),
            MemPoolError::Os(e) => write!(f, "os error: {e}"),
        }
    }
}

impl std::error::Error for MemPoolError {}

impl From<io::Error> for MemPoolError {
    fn from(e: io::Error) -> Self {
        MemPoolError::Os(e)
    }
}

impl From<nix::Error> for MemPoolError {
    fn from(e: nix::Error) -> Self {
        MemPoolError::Os(e.into())
    }
}

pub type Result<T> = std::result::Result<T, MemPoolError>;

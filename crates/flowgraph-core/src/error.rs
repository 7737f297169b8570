use std::fmt;

/// Domain error codes surfaced to clients and loggers (spec §7). A plain
/// enum with a `Display` impl, matching the workspace's hand-rolled-enum
/// error style rather than a `thiserror` derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed message, unknown method, version mismatch.
    Protocol,
    /// Method dispatched without the required permission bit.
    Permission,
    FormatIncompatible,
    FormatNotAccepted,
    BufferNotAccepted,
    NoMemory,
    NotSupported,
    BadArgument,
    /// Cycle watchdog expiry or repeated follower xrun.
    SchedulingError,
    /// Nearest posix errno translated to a domain code (spec §7's "OS
    /// errors: mapping, fd, socket errors").
    Os,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::Protocol => "protocol error",
            ErrorCode::Permission => "permission denied",
            ErrorCode::FormatIncompatible => "format incompatible",
            ErrorCode::FormatNotAccepted => "format not accepted",
            ErrorCode::BufferNotAccepted => "buffer not accepted",
            ErrorCode::NoMemory => "no memory",
            ErrorCode::NotSupported => "not supported",
            ErrorCode::BadArgument => "bad argument",
            ErrorCode::SchedulingError => "scheduling error",
            ErrorCode::Os => "os error",
        };
        write!(f, "{s}")
    }
}

/// A domain-level failure carrying both the wire-facing code and a
/// human-readable message, returned by fallible core operations.
#[derive(Debug, Clone)]
pub struct CoreError {
    pub code: ErrorCode,
    pub message: String,
}

impl CoreError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CoreError {}

pub type Result<T> = std::result::Result<T, CoreError>;

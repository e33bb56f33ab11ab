//! Ring Buffer Error Types

use thiserror::Error;

/// Errors raised by the ring buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingBufferError {
    /// Capacity is zero or not a power of two
    #[error("Ring buffer capacity {0} is not a power of two")]
    NotPowerOfTwo(usize),

    /// Attempt to consume more bytes than are buffered
    #[error("Invalid argument: cannot consume {requested} bytes, only {available} buffered")]
    InvalidArgument { requested: usize, available: usize },
}

/// Errors raised when building a terminator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerminatorError {
    /// Terminator has no bytes
    #[error("Terminator must not be empty")]
    Empty,

    /// Terminator longer than the supported maximum
    #[error("Terminator is {0} bytes long, at most 4 are supported")]
    TooLong(usize),
}

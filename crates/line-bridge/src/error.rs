//! Bridge Error Types

use crate::registry::ClientId;
use ring_buffer::{RingBufferError, TerminatorError};
use thiserror::Error;

/// Configuration rejected before the engine is constructed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Buffer size is not a power of two
    #[error("{field} must be a power of two, got {value}")]
    NotPowerOfTwo { field: &'static str, value: usize },

    /// Terminator empty or longer than 4 bytes
    #[error("{field} is invalid: {source}")]
    InvalidTerminator {
        field: &'static str,
        #[source]
        source: TerminatorError,
    },

    /// Timeout must be a positive duration
    #[error("{0} must be a positive duration")]
    ZeroTimeout(&'static str),

    /// Listen port out of range
    #[error("Invalid TCP listen port {0}")]
    InvalidPort(u16),

    /// Limit that must be at least one
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
}

/// Runtime errors of the bridge engine. None of them halt the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// New client rejected because the registry is full
    #[error("Connection limit of {limit} clients reached")]
    ConnectionLimitExceeded { limit: usize },

    /// Client could not keep up and was disconnected
    #[error("Client {client} outbound backlog of {backlog} bytes exceeds limit of {limit}")]
    SlowClientBacklog {
        client: ClientId,
        backlog: usize,
        limit: usize,
    },

    /// Serial port read or write failed
    #[error("Serial transport error: {0}")]
    Serial(std::io::Error),

    /// Ring buffer misuse
    #[error("Buffer error: {0}")]
    Buffer(#[from] RingBufferError),
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Serial(err)
    }
}

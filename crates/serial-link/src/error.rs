//! Transport Error Types

use thiserror::Error;

/// Errors that can occur while setting up a transport
#[derive(Debug, Error)]
pub enum LinkError {
    /// Serial port could not be opened
    #[error("Failed to open serial port {device}: {reason}")]
    Open { device: String, reason: String },

    /// TCP listener could not be bound
    #[error("Failed to listen on port {port}: {reason}")]
    Bind { port: u16, reason: String },

    /// I/O error on an open transport
    #[error("Transport I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io(err.to_string())
    }
}

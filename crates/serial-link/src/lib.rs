//! Serial and TCP Transports
//!
//! Narrow, non-blocking read/write capabilities consumed by the bridge
//! engine, with implementations for `tokio-serial` ports and std TCP
//! sockets, plus in-memory mocks for testing without hardware.

mod error;
pub mod mock;
mod port;
mod transport;

pub use error::LinkError;
pub use port::{SerialPortTransport, SerialSettings};
pub use transport::{bind_listener, ClientSocket, ConnectionListener, ReadOutcome, SerialTransport};

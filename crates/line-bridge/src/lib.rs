//! UART <-> TCP Line Bridge
//!
//! Buffers bytes arriving on a serial line, splits them on a terminator and
//! fans each line out to every connected TCP client; the reverse direction
//! collects client bytes into lines written back to the serial port.
//!
//! The engine has no threads or timers of its own. The host calls
//! [`BridgeEngine::tick`] periodically and every step inside it is
//! non-blocking.

mod config;
mod engine;
mod error;
mod flush;
mod keepalive;
mod registry;
mod stats;

pub use config::{BridgeConfig, BridgeSettings, DirectionSettings, KeepaliveSettings};
pub use engine::{BridgeEngine, TickSummary};
pub use error::{BridgeError, ConfigError};
pub use flush::{after_timeout, FlushEvent, FlushPolicy, FlushState, OverrideDecision, TimeoutOverride};
pub use keepalive::KeepaliveTimer;
pub use registry::{Client, ClientId, ClientRegistry, DisconnectReason};
pub use stats::BridgeStats;

pub use ring_buffer::{OverflowPolicy, Terminator};

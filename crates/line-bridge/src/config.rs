//! Bridge Configuration
//!
//! [`BridgeConfig`] is the raw, deserialisable surface. [`BridgeConfig::validate`]
//! turns it into [`BridgeSettings`], the only form the engine accepts.

use crate::error::ConfigError;
use ring_buffer::{OverflowPolicy, Terminator};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// TCP listen port
    pub port: u16,
    /// UART -> TCP buffer capacity (power of two)
    pub uart_buffer_size: usize,
    /// TCP -> UART buffer capacity (power of two)
    pub tcp_buffer_size: usize,
    /// Line terminator on the serial side (at most 4 bytes)
    pub uart_terminator: String,
    /// Line terminator on the TCP side (at most 4 bytes)
    pub tcp_terminator: String,
    /// Flush an unterminated UART line after this long without new bytes
    #[serde(alias = "uart_timeout")]
    pub uart_timeout_ms: u64,
    /// Flush an unterminated TCP line after this long without new bytes
    #[serde(alias = "tcp_timeout")]
    pub tcp_timeout_ms: u64,
    /// Forward UART lines with their terminator
    pub uart_include_terminator: bool,
    /// Forward TCP lines with their terminator
    pub tcp_include_terminator: bool,
    /// UART buffer overflow handling
    pub uart_overflow: OverflowPolicy,
    /// TCP buffer overflow handling
    pub tcp_overflow: OverflowPolicy,
    /// Disconnect every client when the UART side times out
    pub uart_timeout_drop_clients: bool,
    /// Keepalive interval during UART idleness (0 = disabled)
    #[serde(alias = "uart_keepalive_interval")]
    pub uart_keepalive_interval_ms: u64,
    /// Keepalive payload written to the serial port
    pub uart_keepalive_message: String,
    /// Append the TCP terminator to the keepalive payload
    pub uart_keepalive_append_terminator: bool,
    /// Send keepalives only while no TCP client is connected
    pub uart_keepalive_only_without_clients: bool,
    /// Maximum concurrent TCP clients
    pub max_clients: usize,
    /// Unsent bytes retained per client before it is dropped
    pub client_backlog_limit: usize,
    /// Drop clients silent for this long (0 = disabled)
    pub client_idle_timeout_ms: u64,
    /// Clear stale UART data when the first client connects
    pub flush_stale_on_connect: bool,
    /// Discard UART bytes while no client is connected
    pub discard_uart_without_clients: bool,
    /// Hold further TCP commands until the serial peer answers
    pub pace_tcp_commands: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: 6638,
            uart_buffer_size: 256,
            tcp_buffer_size: 256,
            uart_terminator: "\r\n".to_string(),
            tcp_terminator: "\r".to_string(),
            uart_timeout_ms: 300,
            tcp_timeout_ms: 300,
            uart_include_terminator: true,
            tcp_include_terminator: true,
            uart_overflow: OverflowPolicy::DropNewest,
            tcp_overflow: OverflowPolicy::DropNewest,
            uart_timeout_drop_clients: false,
            uart_keepalive_interval_ms: 0,
            uart_keepalive_message: String::new(),
            uart_keepalive_append_terminator: false,
            uart_keepalive_only_without_clients: false,
            max_clients: 4,
            client_backlog_limit: 4096,
            client_idle_timeout_ms: 0,
            flush_stale_on_connect: true,
            discard_uart_without_clients: true,
            pace_tcp_commands: false,
        }
    }
}

/// Validated settings for one direction
#[derive(Debug, Clone)]
pub struct DirectionSettings {
    pub buffer_size: usize,
    pub terminator: Terminator,
    pub timeout: Duration,
    pub include_terminator: bool,
    pub overflow: OverflowPolicy,
}

/// Validated keepalive settings
#[derive(Debug, Clone, Default)]
pub struct KeepaliveSettings {
    /// Zero disables the keepalive
    pub interval: Duration,
    pub payload: Vec<u8>,
    /// Hold keepalives while clients are connected
    pub only_without_clients: bool,
}

impl KeepaliveSettings {
    /// Whether a keepalive will ever be sent
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero() && !self.payload.is_empty()
    }
}

/// Immutable, validated engine settings
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub port: u16,
    pub uart: DirectionSettings,
    pub tcp: DirectionSettings,
    pub drop_clients_on_uart_timeout: bool,
    pub keepalive: KeepaliveSettings,
    pub max_clients: usize,
    pub client_backlog_limit: usize,
    pub client_idle_timeout: Option<Duration>,
    pub flush_stale_on_connect: bool,
    pub discard_uart_without_clients: bool,
    pub pace_tcp_commands: bool,
}

fn buffer_size(field: &'static str, value: usize) -> Result<usize, ConfigError> {
    // n & (n - 1) == 0, excluding zero
    if value == 0 || value & (value - 1) != 0 {
        return Err(ConfigError::NotPowerOfTwo { field, value });
    }
    Ok(value)
}

fn terminator(field: &'static str, value: &str) -> Result<Terminator, ConfigError> {
    value
        .parse()
        .map_err(|source| ConfigError::InvalidTerminator { field, source })
}

fn timeout(field: &'static str, ms: u64) -> Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(ConfigError::ZeroTimeout(field));
    }
    Ok(Duration::from_millis(ms))
}

impl BridgeConfig {
    /// Validate and convert into engine settings
    pub fn validate(&self) -> Result<BridgeSettings, ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        if self.max_clients == 0 {
            return Err(ConfigError::ZeroLimit("max_clients"));
        }
        if self.client_backlog_limit == 0 {
            return Err(ConfigError::ZeroLimit("client_backlog_limit"));
        }

        let uart = DirectionSettings {
            buffer_size: buffer_size("uart_buffer_size", self.uart_buffer_size)?,
            terminator: terminator("uart_terminator", &self.uart_terminator)?,
            timeout: timeout("uart_timeout", self.uart_timeout_ms)?,
            include_terminator: self.uart_include_terminator,
            overflow: self.uart_overflow,
        };
        let tcp = DirectionSettings {
            buffer_size: buffer_size("tcp_buffer_size", self.tcp_buffer_size)?,
            terminator: terminator("tcp_terminator", &self.tcp_terminator)?,
            timeout: timeout("tcp_timeout", self.tcp_timeout_ms)?,
            include_terminator: self.tcp_include_terminator,
            overflow: self.tcp_overflow,
        };

        let mut payload = self.uart_keepalive_message.as_bytes().to_vec();
        if self.uart_keepalive_append_terminator && !payload.is_empty() {
            payload.extend_from_slice(tcp.terminator.as_bytes());
        }

        Ok(BridgeSettings {
            port: self.port,
            uart,
            tcp,
            drop_clients_on_uart_timeout: self.uart_timeout_drop_clients,
            keepalive: KeepaliveSettings {
                interval: Duration::from_millis(self.uart_keepalive_interval_ms),
                payload,
                only_without_clients: self.uart_keepalive_only_without_clients,
            },
            max_clients: self.max_clients,
            client_backlog_limit: self.client_backlog_limit,
            client_idle_timeout: (self.client_idle_timeout_ms > 0)
                .then(|| Duration::from_millis(self.client_idle_timeout_ms)),
            flush_stale_on_connect: self.flush_stale_on_connect,
            discard_uart_without_clients: self.discard_uart_without_clients,
            pace_tcp_commands: self.pace_tcp_commands,
        })
    }
}

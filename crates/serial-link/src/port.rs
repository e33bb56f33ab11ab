//! Serial Port Transport
//!
//! Wraps a `tokio-serial` port opened with a zero timeout so every read and
//! write returns immediately.

use crate::error::LinkError;
use crate::transport::SerialTransport;
use serde::{Deserialize, Serialize};
use std::io::{self, ErrorKind, Read, Write};
use std::time::Duration;
use tokio_serial::SerialPort;
use tracing::info;

/// Default serial baud rate
const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    pub device: String,
    /// Baud rate for serial communication
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Non-blocking serial port
pub struct SerialPortTransport {
    device: String,
    port: Box<dyn SerialPort>,
}

impl SerialPortTransport {
    /// Open the configured serial device
    pub fn open(settings: &SerialSettings) -> Result<Self, LinkError> {
        info!(
            "Opening serial port {} at {} baud",
            settings.device, settings.baud_rate
        );

        let port = tokio_serial::new(settings.device.as_str(), settings.baud_rate)
            .timeout(Duration::ZERO)
            .open()
            .map_err(|e| LinkError::Open {
                device: settings.device.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            device: settings.device.clone(),
            port,
        })
    }

    /// Device path this transport was opened on
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl SerialTransport for SerialPortTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pending = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        if pending == 0 || buf.is_empty() {
            return Ok(0);
        }

        let len = pending.min(buf.len());
        match self.port.read(&mut buf[..len]) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.port.write(data) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn discard_input(&mut self) -> io::Result<usize> {
        let pending = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        self.port
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(io::Error::from)?;
        Ok(pending)
    }
}

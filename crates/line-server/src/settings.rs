//! Server Settings
//!
//! Layered configuration: an optional TOML file overridden by
//! `LINE_SERVER_*` environment variables, e.g.
//! `LINE_SERVER_BRIDGE__PORT=7000` or `LINE_SERVER_SERIAL__DEVICE=/dev/ttyS1`.

use config::{Config, ConfigError, Environment, File};
use line_bridge::BridgeConfig;
use serde::Deserialize;
use serial_link::SerialSettings;
use std::time::Duration;

/// Settings file used when no path is given on the command line
pub const DEFAULT_SETTINGS_PATH: &str = "line-server.toml";

/// Environment variable prefix
const ENV_PREFIX: &str = "LINE_SERVER";

/// Host process settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Scheduler tick period in milliseconds
    pub tick_interval_ms: u64,
    /// Address of the status/health HTTP endpoint
    pub status_addr: String,
    /// Address of the Prometheus exporter; empty disables it
    pub metrics_addr: String,
    /// Maximum log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            status_addr: "0.0.0.0:8080".to_string(),
            metrics_addr: "0.0.0.0:9000".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl HostSettings {
    /// Tick period, never shorter than one millisecond
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Complete daemon configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bridge: BridgeConfig,
    pub serial: SerialSettings,
    pub server: HostSettings,
}

impl ServerSettings {
    /// Load from `path` (missing file is fine) and the environment
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> ServerSettings {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(settings.bridge.port, 6638);
        assert_eq!(settings.serial.baud_rate, 115_200);
        assert_eq!(settings.server.tick_interval(), Duration::from_millis(10));
        assert_eq!(settings.server.log_level, "info");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let settings = ServerSettings::load("/nonexistent/line-server.toml").unwrap();
        assert_eq!(settings.bridge.uart_buffer_size, 256);
        assert_eq!(settings.server.status_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_toml_sections() {
        let settings = from_toml(
            r#"
            [bridge]
            port = 7000
            uart_terminator = "\n"
            uart_timeout = 150
            uart_keepalive_message = "AT"

            [serial]
            device = "/dev/ttyS1"
            baud_rate = 9600

            [server]
            tick_interval_ms = 0
            "#,
        );

        assert_eq!(settings.bridge.port, 7000);
        assert_eq!(settings.bridge.uart_terminator, "\n");
        assert_eq!(settings.bridge.uart_timeout_ms, 150);
        assert_eq!(settings.bridge.tcp_terminator, "\r");
        assert_eq!(settings.serial.device, "/dev/ttyS1");
        assert_eq!(settings.serial.baud_rate, 9600);
        assert_eq!(settings.server.tick_interval(), Duration::from_millis(1));
        assert!(settings.bridge.validate().is_ok());
    }
}

//! Configuration schema definitions.
//!
//! Every section has serde defaults, so a config file only needs the keys it
//! changes.

use super::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub device: DeviceConfig,
    pub nfs: NfsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values no console session can work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.baud == 0 {
            return Err(ConfigError::validation("serial.baud", "must be greater than zero"));
        }
        if self.device.status_max_attempts == 0 {
            return Err(ConfigError::validation(
                "device.status_max_attempts",
                "must be at least 1",
            ));
        }
        if self.device.interface_command.trim().is_empty() {
            return Err(ConfigError::validation(
                "device.interface_command",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

/// `[serial]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name or alias; may also come from the command line.
    pub port: Option<String>,
    pub baud: u32,
    /// Per-read timeout in milliseconds.
    pub timeout_ms: u64,
    #[serde(default)]
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115_200,
            timeout_ms: 1000,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

/// `[device]` section: how the board is probed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub interface_command: String,
    pub max_rx_errors: u64,
    pub status_max_attempts: u32,
    pub status_retry_delay_ms: u64,
    /// Read window for helper commands in milliseconds.
    pub command_read_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            interface_command: "ifconfig".to_string(),
            max_rx_errors: 20,
            status_max_attempts: 5,
            status_retry_delay_ms: 2000,
            command_read_ms: 1000,
        }
    }
}

impl DeviceConfig {
    pub fn status_retry_delay(&self) -> Duration {
        Duration::from_millis(self.status_retry_delay_ms)
    }

    pub fn command_read(&self) -> Duration {
        Duration::from_millis(self.command_read_ms)
    }
}

/// `[nfs]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NfsConfig {
    pub mount_point: String,
    /// Passed to `mount -o`.
    pub options: String,
}

impl Default for NfsConfig {
    fn default() -> Self {
        Self {
            mount_point: "/mnt".to_string(),
            options: "nolock".to_string(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "serial_console=debug". `RUST_LOG` wins.
    pub level: String,
    pub format: LogFormat,
    /// Colorize output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            ansi: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
    Compact,
}

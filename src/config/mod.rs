//! TOML configuration with environment overrides.
//!
//! # Configuration Resolution
//!
//! 1. `SERIAL_CONSOLE_CONFIG` environment variable (explicit path)
//! 2. `./serial-console.toml`
//! 3. `~/.config/serial-console/config.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\serial-console\config.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! `SERIAL_CONSOLE_<SECTION>_<KEY>`, for example:
//! - `SERIAL_CONSOLE_SERIAL_PORT=/dev/ttyUSB0`
//! - `SERIAL_CONSOLE_SERIAL_BAUD=115200`
//! - `SERIAL_CONSOLE_DEVICE_MAX_RX_ERRORS=50`
//!
//! # Example
//!
//! ```toml
//! [serial]
//! port = "evb"
//! port_aliases = { evb = "/dev/ttyUSB0" }
//!
//! [device]
//! status_max_attempts = 3
//!
//! [nfs]
//! mount_point = "/mnt"
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, DeviceConfig, LogFormat, LoggingConfig, NfsConfig, SerialConfig};

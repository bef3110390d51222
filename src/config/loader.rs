//! Config file resolution, environment overrides and persistence.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_CONSOLE";

/// Explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_CONSOLE_CONFIG";

/// Looked up in the working directory.
const LOCAL_CONFIG_FILE: &str = "serial-console.toml";

/// Looked up in the per-user config directory.
const CONFIG_FILE_NAME: &str = "config.toml";

const APP_DIR: &str = "serial-console";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// 1. `SERIAL_CONSOLE_CONFIG` (explicit path)
    /// 2. `./serial-console.toml`
    /// 3. `$XDG_CONFIG_HOME/serial-console/config.toml` or `%APPDATA%\serial-console\config.toml`
    /// 4. Built-in defaults
    ///
    /// Environment overrides are applied on top, then the result is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Defaults plus environment overrides; malformed overrides are ignored.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        let _ = apply_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to the file it was loaded from.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired("No config file path set".to_string()))?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            let mut config = load_from_file(path)?;
            apply_env_overrides(&mut config)?;
            config.validate()?;
            self.config = config;
        }
        Ok(())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    get_default_config_path().filter(|path| path.exists())
}

fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

/// Per-user directory for new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(APP_DIR))
}

/// Per-user config file path.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read `SERIAL_CONSOLE_<key>` and parse it, if set.
fn env_override<T: FromStr>(key: &str, what: &str) -> ConfigResult<Option<T>> {
    let var = format!("{ENV_PREFIX}_{key}");
    match std::env::var(&var) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::env_parse(var, format!("Invalid {what}"))),
        Err(_) => Ok(None),
    }
}

/// Apply `SERIAL_CONSOLE_<SECTION>_<KEY>` overrides.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERIAL_PORT")) {
        config.serial.port = Some(val);
    }
    if let Some(baud) = env_override("SERIAL_BAUD", "baud rate")? {
        config.serial.baud = baud;
    }
    if let Some(ms) = env_override("SERIAL_TIMEOUT_MS", "timeout")? {
        config.serial.timeout_ms = ms;
    }

    if let Some(limit) = env_override("DEVICE_MAX_RX_ERRORS", "error threshold")? {
        config.device.max_rx_errors = limit;
    }
    if let Some(attempts) = env_override("DEVICE_STATUS_MAX_ATTEMPTS", "attempt count")? {
        config.device.status_max_attempts = attempts;
    }

    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOGGING_LEVEL")) {
        config.logging.level = val;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOGGING_FORMAT")) {
        config.logging.format = match val.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => {
                return Err(ConfigError::env_parse(
                    format!("{ENV_PREFIX}_LOGGING_FORMAT"),
                    "Expected json, pretty or compact",
                ))
            }
        };
    }

    Ok(())
}

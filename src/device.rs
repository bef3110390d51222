//! Board health helpers built on a console session.
//!
//! These scrape `ifconfig`-style output with two small regexes and drive the
//! NFS mount used to stage test payloads on the board.

use crate::config::Config;
use crate::error::{SessionError, SessionResult};
use crate::session::Session;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Returned by [`Session::get_ip`] when the board has no address.
pub const IP_NOT_FOUND: &str = "-1";

/// Printed by busybox `mount` when the NFS server cannot be reached.
pub const NETWORK_UNREACHABLE: &str = "Network is unreachable";

static INET_ADDR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"inet addr:\b((?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9]?[0-9]))\b",
    )
    .expect("valid inet addr regex")
});

static ERROR_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"errors:([0-9]+)").expect("valid error count regex"));

/// First IPv4 address printed after `inet addr:`.
pub fn extract_ip(text: &str) -> Option<String> {
    INET_ADDR
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// First `errors:<N>` counter. Counts too large for `u64` saturate.
pub fn extract_error_count(text: &str) -> Option<u64> {
    ERROR_COUNT
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().parse().unwrap_or(u64::MAX))
}

/// Board-specific commands and thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Command that lists interfaces with `inet addr:` and `errors:` fields.
    pub interface_command: String,
    /// Packet error count above which the network is considered broken.
    pub max_rx_errors: u64,
    /// Read window for helper commands.
    pub command_read: Duration,
    pub mount_point: String,
    pub mount_options: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            interface_command: "ifconfig".to_string(),
            max_rx_errors: 20,
            command_read: Duration::from_secs(1),
            mount_point: "/mnt".to_string(),
            mount_options: "nolock".to_string(),
        }
    }
}

impl DeviceProfile {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interface_command: config.device.interface_command.clone(),
            max_rx_errors: config.device.max_rx_errors,
            command_read: config.device.command_read(),
            mount_point: config.nfs.mount_point.clone(),
            mount_options: config.nfs.options.clone(),
        }
    }

    /// Whether `count` packet errors is still acceptable.
    pub fn errors_healthy(&self, count: u64) -> bool {
        count <= self.max_rx_errors
    }

    /// `mount ...;cd <mount point>/;ls` for the given export.
    pub fn mount_command(&self, ip: &str, path: &str) -> String {
        format!(
            "mount -t nfs -o {} {ip}:{path} {mp};cd {mp}/;ls",
            self.mount_options,
            mp = self.mount_point
        )
    }
}

/// How often [`Session::check_status`] re-probes an unhealthy board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.device.status_max_attempts,
            delay: config.device.status_retry_delay(),
        }
    }
}

/// A board that answered with an address and an acceptable error count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub ip: String,
    pub error_count: u64,
    /// Attempt (1-based) on which the board was found healthy.
    pub attempts: u32,
}

/// What [`Session::mount_nfs`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountOutcome {
    /// The keyword was already visible before mounting; no mount was issued.
    AlreadyMounted,
    Mounted,
    /// Neither the keyword nor a failure marker appeared.
    Unconfirmed,
}

impl Session {
    fn list_interfaces(&mut self) -> SessionResult<String> {
        let command = self.profile.interface_command.clone();
        self.execute_text(&command)
    }

    /// IPv4 address of the board, or [`IP_NOT_FOUND`].
    pub fn get_ip(&mut self) -> SessionResult<String> {
        let listing = self.list_interfaces()?;
        Ok(extract_ip(&listing).unwrap_or_else(|| IP_NOT_FOUND.to_string()))
    }

    /// `false` when the first packet error counter exceeds the profile's limit.
    ///
    /// # Errors
    ///
    /// `SessionError::MissingErrorCount` if the listing has no counter.
    pub fn get_network_err(&mut self) -> SessionResult<bool> {
        let listing = self.list_interfaces()?;
        let count = extract_error_count(&listing).ok_or(SessionError::MissingErrorCount)?;
        Ok(self.profile.errors_healthy(count))
    }

    /// Probe the board until it reports an address and a tolerable error
    /// count, giving up after `policy.max_attempts`.
    pub fn check_status(&mut self, policy: RetryPolicy) -> SessionResult<DeviceStatus> {
        let attempts = policy.max_attempts.max(1);
        let mut last_fault = String::new();

        for attempt in 1..=attempts {
            let listing = self.list_interfaces()?;

            match (extract_ip(&listing), extract_error_count(&listing)) {
                (None, _) => {
                    last_fault = "no IPv4 address assigned".to_string();
                    self.logged(|| {
                        error!(attempt, "<-----IP NOT FOUND! The device needs a reboot------>")
                    });
                }
                (Some(_), None) => {
                    last_fault = "no packet error counter in interface listing".to_string();
                    self.logged(|| warn!(attempt, "interface listing has no errors: counter"));
                }
                (Some(_), Some(count)) if !self.profile.errors_healthy(count) => {
                    last_fault = format!(
                        "packet error count {count} exceeds {}",
                        self.profile.max_rx_errors
                    );
                    self.logged(|| {
                        error!(
                            attempt,
                            count,
                            "<-----Network RX ERROR exceeds the upper limit! The device needs a reboot------>"
                        )
                    });
                }
                (Some(ip), Some(count)) => {
                    self.logged(|| info!(attempt, ip = %ip, errors = count, "device network healthy"));
                    return Ok(DeviceStatus {
                        ip,
                        error_count: count,
                        attempts: attempt,
                    });
                }
            }

            if attempt < attempts {
                thread::sleep(policy.delay);
            }
        }

        Err(SessionError::StatusCheckExhausted {
            attempts,
            last_fault,
        })
    }

    /// Mount `ip:path` over NFS unless `keyword` is already listed.
    ///
    /// On an unreachable network or a reported failure the session is closed
    /// and the captured output is returned in the error.
    pub fn mount_nfs(&mut self, ip: &str, path: &str, keyword: &str) -> SessionResult<MountOutcome> {
        let listing = self.execute_text("ls")?;
        if listing.contains(keyword) {
            self.logged(|| info!("Already Mount!"));
            return Ok(MountOutcome::AlreadyMounted);
        }

        let command = self.profile.mount_command(ip, path);
        let output = self.execute_text(&command)?;

        if output.contains(keyword) {
            self.logged(|| info!("Mount success!:{output}"));
            Ok(MountOutcome::Mounted)
        } else if output.contains(NETWORK_UNREACHABLE) {
            self.logged(|| error!("Network is unreachable! Please reboot the device. received:{output}"));
            self.close();
            Err(SessionError::NetworkUnreachable { output })
        } else if output.contains("failed") {
            self.logged(|| warn!("Failed! :{output}"));
            self.close();
            Err(SessionError::MountFailed { output })
        } else {
            self.logged(|| warn!(keyword, "mount result unconfirmed: {output}"));
            Ok(MountOutcome::Unconfirmed)
        }
    }
}

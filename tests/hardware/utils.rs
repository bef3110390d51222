//! Utility functions for hardware testing.
//!
//! Provides port discovery and a session opener driven by environment variables.

use serial_console::Session;
use serialport::{available_ports, SerialPortInfo, SerialPortType};
use std::env;
use std::time::Duration;

/// Test board settings from environment.
pub struct TestBoard {
    pub port_name: String,
    pub baud_rate: u32,
    /// A command the board's shell answers quickly.
    pub probe_command: String,
    /// Text the probe command is known to print.
    pub probe_keyword: String,
}

impl TestBoard {
    /// `TEST_PORT` is required; `TEST_BAUD`, `TEST_PROBE` and
    /// `TEST_PROBE_KEYWORD` default to 115200, `uname -a` and `Linux`.
    pub fn from_env() -> Option<Self> {
        let port_name = env::var("TEST_PORT").ok()?;
        let baud_rate = env::var("TEST_BAUD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(115_200);

        Some(TestBoard {
            port_name,
            baud_rate,
            probe_command: env::var("TEST_PROBE").unwrap_or_else(|_| "uname -a".to_string()),
            probe_keyword: env::var("TEST_PROBE_KEYWORD").unwrap_or_else(|_| "Linux".to_string()),
        })
    }

    pub fn open(&self) -> Session {
        Session::open(&self.port_name, self.baud_rate, Duration::from_secs(1))
            .unwrap_or_else(|e| panic!("Failed to open {}: {e}", self.port_name))
    }
}

/// Discover all available serial ports on the system.
pub fn discover_available_ports() -> Vec<SerialPortInfo> {
    available_ports().unwrap_or_default()
}

/// Find USB serial ports (excludes Bluetooth and other types).
pub fn discover_usb_ports() -> Vec<SerialPortInfo> {
    discover_available_ports()
        .into_iter()
        .filter(|port| matches!(port.port_type, SerialPortType::UsbPort(_)))
        .collect()
}

/// Skip test if no board is configured.
#[macro_export]
macro_rules! require_board {
    () => {
        match $crate::hardware::utils::TestBoard::from_env() {
            Some(board) => board,
            None => {
                eprintln!("Skipping: set TEST_PORT to run hardware tests");
                return;
            }
        }
    };
}

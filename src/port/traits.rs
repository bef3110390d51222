//! Transport seam between a console session and the wire.
//!
//! `SerialPortAdapter` is implemented by the real `serialport`-backed
//! transport and by `MockSerialPort`, so session logic can be driven
//! without hardware.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Line settings used when opening a console port.
///
/// Board consoles are almost always 8N1 at 115200 baud, so that is the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits.
    pub data_bits: DataBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Per-read timeout.
    pub timeout: Duration,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            timeout: Duration::from_secs(1),
        }
    }
}

impl PortConfiguration {
    /// 8N1 at the given baud rate and read timeout.
    pub fn console(baud_rate: u32, timeout: Duration) -> Self {
        Self {
            baud_rate,
            timeout,
            ..Self::default()
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Seven,
    Eight,
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Byte-level operations a console session needs from its transport.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the port, returning how many were written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read whatever is available into `buffer`, blocking up to the
    /// configured timeout.
    ///
    /// An idle line surfaces as an error for which [`PortError::is_idle`]
    /// returns true.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Current per-read timeout.
    fn timeout(&self) -> Duration;

    /// Set the per-read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Discard unread input and unsent output.
    fn clear_buffers(&mut self) -> Result<(), PortError>;

    /// Number of bytes that can be read without blocking.
    ///
    /// Returns `None` if the transport cannot tell.
    fn bytes_to_read(&self) -> Option<usize> {
        None
    }
}

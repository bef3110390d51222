//! Hardware transport over the `serialport` crate.

use super::error::PortError;
use super::traits::{PortConfiguration, SerialPortAdapter};
use std::io::{Read, Write};
use std::time::Duration;

/// A real serial port implementing [`SerialPortAdapter`].
pub struct SyncSerialPort {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SyncSerialPort {
    /// Open a serial port with the given configuration.
    ///
    /// A port held by another process is reported as [`PortError::Busy`]
    /// so callers can tell "claimed" apart from other failures.
    ///
    /// # Example
    /// ```no_run
    /// use serial_console::port::{PortConfiguration, SyncSerialPort};
    ///
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", PortConfiguration::default())?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(port_name: &str, config: PortConfiguration) -> Result<Self, PortError> {
        let port = serialport::new(port_name, config.baud_rate)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.timeout)
            .open()
            .map_err(|e| classify_open_error(port_name, e))?;

        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }

    /// Current baud rate as reported by the driver.
    pub fn baud_rate(&self) -> Option<u32> {
        self.port.baud_rate().ok()
    }
}

fn classify_open_error(port_name: &str, e: serialport::Error) -> PortError {
    match e.kind() {
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            PortError::busy(port_name)
        }
        serialport::ErrorKind::NoDevice if is_busy_message(&e.description) => {
            PortError::busy(port_name)
        }
        serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
        serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
        _ if is_busy_message(&e.description) => PortError::busy(port_name),
        _ => PortError::Serial(e),
    }
}

fn is_busy_message(description: &str) -> bool {
    let lower = description.to_ascii_lowercase();
    ["busy", "access is denied", "permission denied", "in use"]
        .iter()
        .any(|needle| lower.contains(needle))
}

impl SerialPortAdapter for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.port.read(buffer).map_err(PortError::Io)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.port.timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.port.set_timeout(timeout).map_err(PortError::Serial)
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(PortError::Serial)
    }

    fn bytes_to_read(&self) -> Option<usize> {
        self.port.bytes_to_read().ok().map(|n| n as usize)
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.baud_rate())
            .finish()
    }
}

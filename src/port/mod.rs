//! Port abstraction layer for serial communication.
//!
//! A console session talks to a `SerialPortAdapter`; the real implementation
//! wraps the `serialport` crate and the mock one replays scripted replies.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::MockSerialPort;
pub use sync_port::SyncSerialPort;
pub use traits::{DataBits, Parity, PortConfiguration, SerialPortAdapter};

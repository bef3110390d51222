//! Serial Console Library
//!
//! Drives an embedded board's shell over a serial line: send a command,
//! capture what it prints for a while or until a keyword shows up, and strip
//! the shell's color codes from the capture. Device helpers on top scrape the
//! board's IP address and packet error counters and mount NFS shares.
//!
//! # Modules
//!
//! - `port`: transport trait with `serialport` and mock implementations
//! - `session`: the console session (send, read, read-until, execute)
//! - `sanitize`: decoding and color-code removal for captured output
//! - `device`: IP / error-count scraping, status checks, NFS mounting
//! - `config`: TOML configuration with environment overrides
//! - `logging`: `tracing` dispatchers injected into sessions
//! - `error`: session error type
//!
//! # Example
//!
//! ```no_run
//! use serial_console::{ReadMode, Session};
//! use std::time::Duration;
//!
//! let mut session = Session::open("/dev/ttyUSB0", 115_200, Duration::from_secs(1))?;
//! let booted = session.expect("cat /proc/uptime", ".", Duration::from_secs(5))?;
//! let listing = session.execute("ls /", None, Duration::from_secs(1), ReadMode::Fixed)?;
//! println!("{booted} {}", listing.output);
//! session.close();
//! # Ok::<(), serial_console::SessionError>(())
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod port;
pub mod sanitize;
pub mod session;

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
pub use device::{
    extract_error_count, extract_ip, DeviceProfile, DeviceStatus, MountOutcome, RetryPolicy,
    IP_NOT_FOUND,
};
pub use error::{SessionError, SessionResult};
pub use port::{MockSerialPort, PortConfiguration, PortError, SerialPortAdapter, SyncSerialPort};
pub use sanitize::{decode_permissive, sanitize};
pub use session::{Execution, ReadMode, Session, SessionOptions};

use crate::port::PortError;
use thiserror::Error;

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised by a console session and the device helpers built on it.
///
/// Keyword misses are not errors; they come back as `false` with a warning.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Another process holds the port.
    #[error("serial port {port} is already in use; release it and retry")]
    PortUnavailable { port: String },

    /// The port could not be opened for any other reason.
    #[error("failed to open serial port {port}: {source}")]
    OpenFailure {
        port: String,
        #[source]
        source: PortError,
    },

    /// No port name was given on the command line or in the config.
    #[error("no serial port configured")]
    NoPortConfigured,

    /// The session was closed before this operation.
    #[error("operation requires an open serial session, but it is closed")]
    NotOpen,

    /// A read, write or control call on the transport failed.
    #[error("serial transport error: {0}")]
    Port(#[from] PortError),

    /// The interface listing had no `errors:<N>` counter to inspect.
    #[error("no packet error counter found in interface listing")]
    MissingErrorCount,

    /// The board never reported a healthy network within the retry budget.
    #[error("device status still unhealthy after {attempts} attempts: {last_fault}")]
    StatusCheckExhausted { attempts: u32, last_fault: String },

    /// The mount command reported the network as unreachable.
    #[error("network is unreachable, reboot the device; received: {output}")]
    NetworkUnreachable { output: String },

    /// The mount command reported a failure.
    #[error("mount failed: {output}")]
    MountFailed { output: String },
}

impl SessionError {
    /// Map a transport error raised while opening `port`.
    pub(crate) fn from_open(port: &str, source: PortError) -> Self {
        match source {
            PortError::Busy(_) => Self::PortUnavailable {
                port: port.to_string(),
            },
            source => Self::OpenFailure {
                port: port.to_string(),
                source,
            },
        }
    }
}

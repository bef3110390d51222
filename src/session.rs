//! Serial console session.
//!
//! A [`Session`] owns one open transport and layers the console workflow on
//! top of it: frame and send a shell command, capture what the board prints
//! for a while, and check the capture for a keyword.
//!
//! Every read starts by flushing both buffers, so each command/read cycle
//! only sees output produced after it began.

use crate::config::Config;
use crate::device::DeviceProfile;
use crate::error::{SessionError, SessionResult};
use crate::port::{PortConfiguration, PortError, SerialPortAdapter, SyncSerialPort};
use crate::sanitize::{clean_bytes, sanitize};
use memchr::memmem;
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Dispatch};

/// Upper bound on bytes captured by [`Session::read_until`] (10 MiB).
pub const MAX_READ_UNTIL_BYTES: usize = 10 * 1024 * 1024;

/// Length of one polling slice in [`ReadMode::Until`].
pub const POLL_SLICE: Duration = Duration::from_millis(500);

/// Terminal interrupt (Ctrl+C).
pub const INTERRUPT: u8 = 0x03;

const IDLE_BACKOFF: Duration = Duration::from_millis(5);
const CHUNK_SIZE: usize = 4096;

/// How [`Session::execute`] waits for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Read for the whole duration, then check the keyword once.
    #[default]
    Fixed,
    /// Read in half-second slices and stop at the first slice containing the keyword.
    Until,
}

/// Output of one executed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Execution {
    pub command: String,
    /// Sanitized text captured after the command was sent.
    pub output: String,
    /// `Some(found)` when a keyword was given.
    pub keyword_found: Option<bool>,
}

impl Execution {
    /// True only if a keyword was given and seen.
    pub fn matched(&self) -> bool {
        self.keyword_found.unwrap_or(false)
    }
}

/// Settings applied when a session is created.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub baud_rate: u32,
    /// Per-read transport timeout.
    pub timeout: Duration,
    pub profile: DeviceProfile,
    /// Where the session's log events go; the ambient default if `None`.
    pub dispatch: Option<Dispatch>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            timeout: Duration::from_secs(1),
            profile: DeviceProfile::default(),
            dispatch: None,
        }
    }
}

impl SessionOptions {
    /// Options taken from the `[serial]`, `[device]` and `[nfs]` sections.
    pub fn from_config(config: &Config) -> Self {
        Self {
            baud_rate: config.serial.baud,
            timeout: config.serial.timeout(),
            profile: DeviceProfile::from_config(config),
            dispatch: None,
        }
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }
}

/// Run `f` with `log` as the current dispatcher, if one was injected.
pub(crate) fn with_log<R>(log: Option<&Dispatch>, f: impl FnOnce() -> R) -> R {
    match log {
        Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
        None => f(),
    }
}

/// One console connection and its read/write/timeout state.
#[derive(Debug)]
pub struct Session {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    transport: Option<Box<dyn SerialPortAdapter>>,
    pub(crate) profile: DeviceProfile,
    log: Option<Dispatch>,
}

impl Session {
    /// Open `port_name` at 8N1 with default device settings.
    ///
    /// # Errors
    ///
    /// - `SessionError::PortUnavailable` if another process holds the port
    /// - `SessionError::OpenFailure` for any other transport failure
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> SessionResult<Self> {
        Self::open_with(
            port_name,
            SessionOptions {
                baud_rate,
                timeout,
                ..SessionOptions::default()
            },
        )
    }

    /// Open `port_name` with explicit options.
    pub fn open_with(port_name: &str, options: SessionOptions) -> SessionResult<Self> {
        let config = PortConfiguration::console(options.baud_rate, options.timeout);
        match SyncSerialPort::open(port_name, config) {
            Ok(port) => Self::with_transport(Box::new(port), options),
            Err(e) => {
                with_log(options.dispatch.as_ref(), || {
                    error!(port = port_name, error = %e, "failed to open serial port")
                });
                Err(SessionError::from_open(port_name, e))
            }
        }
    }

    /// Open the port named in `config`, resolving aliases.
    pub fn from_config(config: &Config) -> SessionResult<Self> {
        let port = config
            .serial
            .port
            .as_deref()
            .ok_or(SessionError::NoPortConfigured)?;
        let port = config.serial.resolve_port(port);
        Self::open_with(&port, SessionOptions::from_config(config))
    }

    /// Build a session over an already-open transport.
    ///
    /// The transport's timeout is set from `options` and both buffers are
    /// cleared, exactly as when opening a hardware port.
    pub fn with_transport(
        mut transport: Box<dyn SerialPortAdapter>,
        options: SessionOptions,
    ) -> SessionResult<Self> {
        transport.set_timeout(options.timeout)?;
        transport.clear_buffers()?;

        let session = Self {
            port_name: transport.name().to_string(),
            baud_rate: options.baud_rate,
            timeout: options.timeout,
            transport: Some(transport),
            profile: options.profile,
            log: options.dispatch,
        };
        session.logged(|| {
            info!(
                port = %session.port_name,
                baud = session.baud_rate,
                timeout_ms = session.timeout.as_millis() as u64,
                "serial session opened"
            )
        });
        Ok(session)
    }

    /// Route this session's log events to `dispatch`.
    pub fn set_dispatch(&mut self, dispatch: Dispatch) {
        self.log = Some(dispatch);
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Per-read timeout configured at open time.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Close the port. Closing a closed session does nothing.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            self.logged(|| info!(port = %self.port_name, "serial session closed"));
        }
    }

    pub(crate) fn logged<R>(&self, f: impl FnOnce() -> R) -> R {
        with_log(self.log.as_ref(), f)
    }

    fn transport_mut(&mut self) -> SessionResult<&mut dyn SerialPortAdapter> {
        match self.transport.as_deref_mut() {
            Some(port) => Ok(port),
            None => Err(SessionError::NotOpen),
        }
    }

    /// Flush both buffers, nudge the shell back to a prompt with a bare
    /// newline, then send `"\n" + command + "\n"`.
    ///
    /// Returns the number of bytes in the framed command.
    pub fn send_command(&mut self, command: &str) -> SessionResult<usize> {
        let framed = format!("\n{command}\n");
        let port = self.transport_mut()?;
        port.clear_buffers()?;
        port.write_bytes(b"\n")?;
        let sent = port.write_bytes(framed.as_bytes())?;

        self.logged(|| debug!(port = %self.port_name, command, "sent command"));
        Ok(sent)
    }

    /// Interrupt whatever the board is running.
    pub fn ctrl_c(&mut self) -> SessionResult<()> {
        self.transport_mut()?.write_bytes(&[INTERRUPT])?;
        self.logged(|| debug!(port = %self.port_name, "sent interrupt"));
        Ok(())
    }

    /// Capture output for `duration`.
    ///
    /// Buffers are flushed first; each chunk is decoded and sanitized as it
    /// arrives and the joined text is sanitized once more so codes split
    /// across chunks are caught too.
    pub fn read_port(&mut self, duration: Duration) -> SessionResult<String> {
        let port = self.transport_mut()?;
        port.clear_buffers()?;

        let started = Instant::now();
        let mut content = String::new();
        let mut chunk = vec![0u8; CHUNK_SIZE];

        while started.elapsed() < duration {
            let want = match port.bytes_to_read() {
                Some(0) => {
                    thread::sleep(IDLE_BACKOFF);
                    continue;
                }
                Some(n) => n.min(CHUNK_SIZE),
                None => CHUNK_SIZE,
            };
            match port.read_bytes(&mut chunk[..want]) {
                Ok(n) => content.push_str(&clean_bytes(&chunk[..n])),
                Err(e) if e.is_idle() => thread::sleep(IDLE_BACKOFF),
                Err(e) => return Err(e.into()),
            }
        }

        Ok(sanitize(&content))
    }

    /// Read until `keyword` shows up, `timeout` passes, or
    /// [`MAX_READ_UNTIL_BYTES`] have been captured.
    ///
    /// The transport timeout tracks the time left before `timeout` on each
    /// read and is restored afterwards, even on error. The result is not
    /// guaranteed to contain the keyword.
    pub fn read_until(&mut self, keyword: &str, timeout: Duration) -> SessionResult<String> {
        let raw = {
            let log = self.log.as_ref();
            let port = match self.transport.as_deref_mut() {
                Some(port) => port,
                None => return Err(SessionError::NotOpen),
            };
            let mut port = ScopedTimeout::set(port, timeout, log)?;
            port.clear_buffers()?;
            read_to_keyword(&mut *port, keyword.as_bytes(), timeout, MAX_READ_UNTIL_BYTES)?
        };

        let text = clean_bytes(&raw);
        self.logged(|| info!(port = %self.port_name, keyword, "tag: {text}"));
        Ok(text)
    }

    /// Send `command` and capture its output.
    ///
    /// With `ReadMode::Fixed` output is read for `duration` and the keyword,
    /// if any, is checked once. With `ReadMode::Until` output is read in
    /// [`POLL_SLICE`] steps until a slice contains the keyword or `duration`
    /// (counted from just before sending) runs out. An empty keyword is
    /// treated as no keyword.
    pub fn execute(
        &mut self,
        command: &str,
        keyword: Option<&str>,
        duration: Duration,
        mode: ReadMode,
    ) -> SessionResult<Execution> {
        let keyword = keyword.filter(|k| !k.is_empty());
        let started = Instant::now();
        self.send_command(command)?;

        let (output, keyword_found) = match mode {
            ReadMode::Fixed => {
                let output = self.read_port(duration)?;
                let found = keyword.map(|k| output.contains(k));
                (output, found)
            }
            ReadMode::Until => {
                let mut output = String::new();
                let mut found = keyword.map(|_| false);
                while started.elapsed() < duration {
                    let slice = self.read_port(POLL_SLICE)?;
                    let hit = keyword.is_some_and(|k| slice.contains(k));
                    output.push_str(&slice);
                    if hit {
                        found = Some(true);
                        break;
                    }
                }
                (output, found)
            }
        };

        if let (Some(k), Some(found)) = (keyword, keyword_found) {
            self.report_keyword(k, found);
        }
        self.logged(|| info!(port = %self.port_name, command, "[Serial Log]:{output}"));

        Ok(Execution {
            command: command.to_string(),
            output,
            keyword_found,
        })
    }

    /// Run `command` and return whatever it printed in the profile's read window.
    pub fn execute_text(&mut self, command: &str) -> SessionResult<String> {
        let window = self.profile.command_read;
        Ok(self.execute(command, None, window, ReadMode::Fixed)?.output)
    }

    /// Run `command` and poll up to `duration` for `keyword`.
    pub fn expect(&mut self, command: &str, keyword: &str, duration: Duration) -> SessionResult<bool> {
        Ok(self
            .execute(command, Some(keyword), duration, ReadMode::Until)?
            .matched())
    }

    fn report_keyword(&self, keyword: &str, found: bool) {
        self.logged(|| {
            if found {
                info!(port = %self.port_name, "Successfully found keywords:{keyword}");
            } else {
                warn!(port = %self.port_name, "Unsuccessfully found keywords:{keyword}");
            }
        });
    }
}

/// Transport borrowed with a temporary read timeout; the previous timeout
/// is put back on drop.
struct ScopedTimeout<'a> {
    port: &'a mut dyn SerialPortAdapter,
    previous: Duration,
    log: Option<&'a Dispatch>,
}

impl<'a> ScopedTimeout<'a> {
    fn set(
        port: &'a mut dyn SerialPortAdapter,
        timeout: Duration,
        log: Option<&'a Dispatch>,
    ) -> Result<Self, PortError> {
        let previous = port.timeout();
        port.set_timeout(timeout)?;
        Ok(Self {
            port,
            previous,
            log,
        })
    }
}

impl<'a> Deref for ScopedTimeout<'a> {
    type Target = dyn SerialPortAdapter + 'a;

    fn deref(&self) -> &Self::Target {
        self.port
    }
}

impl<'a> DerefMut for ScopedTimeout<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.port
    }
}

impl Drop for ScopedTimeout<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.port.set_timeout(self.previous) {
            with_log(self.log, || {
                warn!(port = self.port.name(), error = %e, "failed to restore read timeout")
            });
        }
    }
}

/// Accumulate bytes until `needle` is seen, `cap` bytes are held or
/// `timeout` elapses. Anything after the needle is dropped.
///
/// The port's read timeout is narrowed to the time left before every read,
/// so a blocking read cannot run past the deadline.
fn read_to_keyword(
    port: &mut dyn SerialPortAdapter,
    needle: &[u8],
    timeout: Duration,
    cap: usize,
) -> Result<Vec<u8>, PortError> {
    let deadline = Instant::now() + timeout;
    let finder = memmem::Finder::new(needle);
    let mut content = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];

    while content.len() < cap {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        port.set_timeout(remaining)?;

        let want = CHUNK_SIZE.min(cap - content.len());
        match port.read_bytes(&mut chunk[..want]) {
            Ok(0) => thread::sleep(IDLE_BACKOFF.min(remaining)),
            Ok(n) => {
                // The needle may straddle the previous chunk.
                let from = content.len().saturating_sub(needle.len().saturating_sub(1));
                content.extend_from_slice(&chunk[..n]);
                if needle.is_empty() {
                    continue;
                }
                if let Some(pos) = finder.find(&content[from..]) {
                    content.truncate(from + pos + needle.len());
                    break;
                }
            }
            Err(e) if e.is_idle() => thread::sleep(IDLE_BACKOFF.min(remaining)),
            Err(e) => return Err(e),
        }
    }

    Ok(content)
}

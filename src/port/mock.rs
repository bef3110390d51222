//! Scripted console transport for tests.
//!
//! `MockSerialPort` plays the part of a board's shell: replies are registered
//! against a trigger string and become readable once a write containing that
//! trigger has been sent and the optional delivery delay has passed. Replies
//! that are still "on the wire" survive a buffer clear, the same way a real
//! board's answer arrives after the host has flushed its input buffer.
//!
//! Each write fires at most one reply: the first registered one whose trigger
//! it contains. One-shot replies are consumed when they fire, so registering
//! several for the same trigger scripts a sequence.

use super::error::PortError;
use super::traits::SerialPortAdapter;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Reply {
    trigger: String,
    payload: Vec<u8>,
    delay: Duration,
    repeat: bool,
}

#[derive(Debug)]
struct InFlight {
    ready_at: Instant,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes that have arrived and can be read.
    read_queue: VecDeque<u8>,
    /// Replies sent by the "board" that have not arrived yet.
    in_flight: Vec<InFlight>,
    replies: Vec<Reply>,
    write_log: Vec<Vec<u8>>,
    should_timeout: bool,
    /// Failure returned by the next read.
    read_error: Option<std::io::ErrorKind>,
    timeout: Duration,
    clear_count: usize,
}

impl MockPortState {
    fn land_arrived(&mut self) {
        let now = Instant::now();
        let mut pending = Vec::with_capacity(self.in_flight.len());
        for item in self.in_flight.drain(..) {
            if item.ready_at <= now {
                self.read_queue.extend(item.payload);
            } else {
                pending.push(item);
            }
        }
        self.in_flight = pending;
    }
}

/// Mock serial port implementation for testing.
///
/// Clones share state, so a test can keep one handle for inspection after
/// handing another to a session.
///
/// # Example
/// ```
/// use serial_console::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.respond_to("uname", b"Linux\r\n# ");
///
/// port.write_bytes(b"\nuname\n").unwrap();
///
/// let mut buffer = [0u8; 32];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Linux\r\n# ");
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                timeout: Duration::from_secs(1),
                ..Default::default()
            })),
        }
    }

    /// Make bytes readable immediately.
    ///
    /// They are lost on the next buffer clear, like stale output on a real line.
    pub fn enqueue_read(&mut self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Reply with `payload` every time a write contains `trigger`.
    pub fn respond_to(&mut self, trigger: &str, payload: &[u8]) {
        self.add_reply(trigger, payload, Duration::ZERO, true);
    }

    /// Reply with `payload` to the next write containing `trigger` only.
    pub fn respond_once(&mut self, trigger: &str, payload: &[u8]) {
        self.add_reply(trigger, payload, Duration::ZERO, false);
    }

    /// Reply with `payload` once, `delay` after a write containing `trigger`.
    pub fn respond_once_after(&mut self, trigger: &str, payload: &[u8], delay: Duration) {
        self.add_reply(trigger, payload, delay, false);
    }

    /// Reply with `payload` every time, `delay` after a write containing `trigger`.
    pub fn respond_after(&mut self, trigger: &str, payload: &[u8], delay: Duration) {
        self.add_reply(trigger, payload, delay, true);
    }

    fn add_reply(&mut self, trigger: &str, payload: &[u8], delay: Duration, repeat: bool) {
        self.state.lock().replies.push(Reply {
            trigger: trigger.to_string(),
            payload: payload.to_vec(),
            delay,
            repeat,
        });
    }

    /// Get a copy of every write, in order.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// All writes concatenated and decoded lossily.
    pub fn written_text(&self) -> String {
        let state = self.state.lock();
        let bytes: Vec<u8> = state.write_log.iter().flatten().copied().collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Whether any write so far contained `needle`.
    pub fn was_sent(&self, needle: &str) -> bool {
        self.written_text().contains(needle)
    }

    /// Set whether the next read/write operation should time out.
    pub fn set_should_timeout(&mut self, should_timeout: bool) {
        self.state.lock().should_timeout = should_timeout;
    }

    /// Make the next read fail with an I/O error of `kind`, as when the
    /// adapter is unplugged mid-read.
    pub fn set_read_error(&mut self, kind: std::io::ErrorKind) {
        self.state.lock().read_error = Some(kind);
    }

    /// Whether buffers have been cleared at least once.
    pub fn was_cleared(&self) -> bool {
        self.clear_count() > 0
    }

    /// How many times buffers have been cleared.
    pub fn clear_count(&self) -> usize {
        self.state.lock().clear_count
    }

    /// The per-read timeout most recently set.
    pub fn current_timeout(&self) -> Duration {
        self.state.lock().timeout
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        let mut state = self.state.lock();
        state.land_arrived();
        state.read_queue.len()
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();

        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }

        state.write_log.push(data.to_vec());

        let text = String::from_utf8_lossy(data);
        let matched = state
            .replies
            .iter()
            .position(|reply| text.contains(&reply.trigger));
        if let Some(idx) = matched {
            let reply = if state.replies[idx].repeat {
                state.replies[idx].clone()
            } else {
                state.replies.remove(idx)
            };
            state.in_flight.push(InFlight {
                ready_at: Instant::now() + reply.delay,
                payload: reply.payload,
            });
        }

        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();

        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }
        if let Some(kind) = state.read_error.take() {
            return Err(PortError::Io(std::io::Error::new(kind, "read failed")));
        }

        state.land_arrived();

        let mut bytes_read = 0;
        for byte in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(b) => {
                    *byte = b;
                    bytes_read += 1;
                }
                None => break,
            }
        }

        if bytes_read == 0 {
            Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "No data available",
            )))
        } else {
            Ok(bytes_read)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.state.lock().timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.state.lock().timeout = timeout;
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.read_queue.clear();
        state.clear_count += 1;
        Ok(())
    }

    fn bytes_to_read(&self) -> Option<usize> {
        Some(self.available_bytes())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .finish()
    }
}

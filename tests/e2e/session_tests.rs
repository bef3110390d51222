//! Session workflow tests: open -> send -> capture -> close, against mock boards.
//!
//! Covers:
//! - fixed-window and until-mode execution
//! - buffer flushing before every read
//! - read-until with timeout restoration
//! - closed-session and transport error paths

use crate::common::{fast_options, session_over};
use pretty_assertions::assert_eq;
use serial_console::{
    MockSerialPort, PortError, ReadMode, Session, SessionError, SessionOptions,
};
use std::time::{Duration, Instant};

#[test]
fn test_execute_returns_captured_text_without_keyword() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_to("uname -r", b"uname -r\r\n4.9.88\r\n# ");
    let mut session = session_over(&mock);

    let exec = session
        .execute("uname -r", None, Duration::from_millis(200), ReadMode::Fixed)
        .unwrap();

    assert_eq!(exec.output, "uname -r\r\n4.9.88\r\n# ");
    assert_eq!(exec.keyword_found, None);
    assert_eq!(exec.command, "uname -r");
}

#[test]
fn test_execute_fixed_mode_reports_keyword_hit() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_to("cat /proc/version", b"Linux version 4.9.88 (gcc)\r\n# ");
    let mut session = session_over(&mock);

    let exec = session
        .execute(
            "cat /proc/version",
            Some("Linux version"),
            Duration::from_millis(200),
            ReadMode::Fixed,
        )
        .unwrap();

    assert_eq!(exec.keyword_found, Some(true));
    assert!(exec.matched());
}

#[test]
fn test_execute_fixed_mode_reports_keyword_miss() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_to("ls", b"bin  etc  usr\r\n# ");
    let mut session = session_over(&mock);

    let exec = session
        .execute("ls", Some("payload.bin"), Duration::from_millis(200), ReadMode::Fixed)
        .unwrap();

    assert_eq!(exec.keyword_found, Some(false));
    assert!(exec.output.contains("etc"));
}

#[test]
fn test_execute_fixed_mode_ignores_output_after_window() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_once_after("sleep 1; echo done", b"done\r\n", Duration::from_millis(600));
    let mut session = session_over(&mock);

    let exec = session
        .execute(
            "sleep 1; echo done",
            Some("done"),
            Duration::from_millis(200),
            ReadMode::Fixed,
        )
        .unwrap();

    assert_eq!(exec.keyword_found, Some(false));
}

#[test]
fn test_empty_keyword_is_treated_as_none() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_to("pwd", b"/root\r\n# ");
    let mut session = session_over(&mock);

    let exec = session
        .execute("pwd", Some(""), Duration::from_millis(150), ReadMode::Fixed)
        .unwrap();

    assert_eq!(exec.keyword_found, None);
    assert!(exec.output.contains("/root"));
}

#[test]
fn test_until_mode_stops_at_first_slice_with_keyword() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_once_after(
        "./encode_test",
        b"frame 1\r\nframe 2\r\nsendFrame 200\r\n",
        Duration::from_millis(200),
    );
    let mut session = session_over(&mock);

    let started = Instant::now();
    let found = session
        .expect("./encode_test", "sendFrame 200", Duration::from_secs(10))
        .unwrap();

    assert!(found);
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "polling should stop early, took {:?}",
        started.elapsed()
    );
}

#[test]
fn test_until_mode_gives_up_after_duration() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_to("dmesg | tail", b"usb 1-1: new device\r\n# ");
    let mut session = session_over(&mock);

    let started = Instant::now();
    let exec = session
        .execute(
            "dmesg | tail",
            Some("panic"),
            Duration::from_millis(900),
            ReadMode::Until,
        )
        .unwrap();

    assert_eq!(exec.keyword_found, Some(false));
    assert!(exec.output.contains("new device"));
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[test]
fn test_until_mode_without_keyword_accumulates_full_duration() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_once_after("top -n 1", b"Mem: 1024K used\r\n", Duration::from_millis(100));
    let mut session = session_over(&mock);

    let started = Instant::now();
    let exec = session
        .execute("top -n 1", None, Duration::from_millis(800), ReadMode::Until)
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(800));
    assert!(exec.output.contains("Mem: 1024K used"));
    assert_eq!(exec.keyword_found, None);
}

#[test]
fn test_execute_sanitizes_colored_output() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_to(
        "ls /",
        b"\x1b[1;34mbin\x1b[0m  \x1b[1;34metc\x1b[0m  \x1b[1;32minit.sh\x1b[0m\r\n# ",
    );
    let mut session = session_over(&mock);

    let exec = session
        .execute("ls /", Some("init.sh"), Duration::from_millis(200), ReadMode::Fixed)
        .unwrap();

    assert_eq!(exec.output, "bin  etc  init.sh\r\n# ");
    assert!(exec.matched());
}

#[test]
fn test_read_port_discards_stale_input() {
    let mut mock = MockSerialPort::new("MOCK0");
    let mut session = session_over(&mock);
    mock.enqueue_read(b"old boot log\r\n");

    let text = session.read_port(Duration::from_millis(100)).unwrap();

    assert_eq!(text, "");
}

#[test]
fn test_read_port_drops_invalid_bytes() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_to("hexdump", b"ok \xff\xfe done");
    let mut session = session_over(&mock);

    session.send_command("hexdump").unwrap();
    let text = session.read_port(Duration::from_millis(100)).unwrap();

    assert_eq!(text, "ok  done");
}

#[test]
fn test_read_until_stops_at_keyword_and_restores_timeout() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_after(
        "test_mpp_venc",
        b"sendFrame 199\r\nsendFrame 200\r\nsendFrame 201\r\n",
        Duration::from_millis(50),
    );
    let mut session = session_over(&mock);
    assert_eq!(mock.current_timeout(), Duration::from_secs(1));

    session.send_command("test_mpp_venc -w 704 -h 576").unwrap();
    let text = session
        .read_until("sendFrame 200", Duration::from_secs(5))
        .unwrap();

    assert_eq!(text, "sendFrame 199\r\nsendFrame 200");
    assert_eq!(mock.current_timeout(), Duration::from_secs(1));
}

#[test]
fn test_read_until_times_out_without_keyword() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_after("cat /dev/kmsg", b"random log line\r\n", Duration::from_millis(20));
    let mut session = session_over(&mock);

    session.send_command("cat /dev/kmsg").unwrap();
    let started = Instant::now();
    let text = session
        .read_until("never printed", Duration::from_millis(300))
        .unwrap();

    assert_eq!(text, "random log line\r\n");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(mock.current_timeout(), Duration::from_secs(1));
}

#[test]
fn test_read_until_restores_timeout_after_read_failure() {
    let mut mock = MockSerialPort::new("MOCK0");
    let mut session = session_over(&mock);
    mock.set_read_error(std::io::ErrorKind::BrokenPipe);

    let result = session.read_until("login:", Duration::from_secs(5));

    match result {
        Err(SessionError::Port(PortError::Io(e))) => {
            assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe)
        }
        other => panic!("expected a transport failure, got {other:?}"),
    }
    assert_eq!(mock.current_timeout(), Duration::from_secs(1));
    assert!(session.is_open());
}

#[test]
fn test_commands_on_closed_session_fail() {
    let mock = MockSerialPort::new("MOCK0");
    let mut session = session_over(&mock);
    session.close();

    assert!(!session.is_open());
    assert!(matches!(
        session.execute("ls", None, Duration::from_millis(10), ReadMode::Fixed),
        Err(SessionError::NotOpen)
    ));
    assert!(matches!(
        session.read_until("#", Duration::from_millis(10)),
        Err(SessionError::NotOpen)
    ));
    assert!(matches!(session.ctrl_c(), Err(SessionError::NotOpen)));
}

#[test]
fn test_write_failure_surfaces_as_port_error() {
    let mut mock = MockSerialPort::new("MOCK0");
    let mut session = session_over(&mock);
    mock.set_should_timeout(true);

    let result = session.send_command("reboot");
    assert!(matches!(result, Err(SessionError::Port(_))));
}

#[test]
fn test_every_command_flushes_buffers_first() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_to("date", b"Thu Jan  1 00:00:00 UTC 1970\r\n# ");
    let mut session = session_over(&mock);
    let after_open = mock.clear_count();

    session
        .execute("date", None, Duration::from_millis(100), ReadMode::Fixed)
        .unwrap();

    // One clear before sending, one before reading.
    assert_eq!(mock.clear_count(), after_open + 2);
}

#[test]
fn test_with_transport_applies_timeout() {
    let mock = MockSerialPort::new("MOCK0");
    let options = SessionOptions {
        timeout: Duration::from_millis(250),
        ..fast_options()
    };

    let session = Session::with_transport(Box::new(mock.clone()), options).unwrap();

    assert_eq!(session.timeout(), Duration::from_millis(250));
    assert_eq!(mock.current_timeout(), Duration::from_millis(250));
    assert!(mock.was_cleared());
}

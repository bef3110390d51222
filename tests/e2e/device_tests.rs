//! Device helper tests: IP scraping, error counters, status retries and NFS mounts.

use crate::common::{
    board_with_ifconfig, session_over, IFCONFIG_HEALTHY, IFCONFIG_NOISY, IFCONFIG_NO_IP,
};
use pretty_assertions::assert_eq;
use serial_console::{MockSerialPort, MountOutcome, RetryPolicy, SessionError, IP_NOT_FOUND};
use std::time::Duration;

const MOUNT_CMD: &str = "mount -t nfs -o nolock 10.0.0.2:/srv/nfs /mnt;cd /mnt/;ls";

fn quick_retries(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        delay: Duration::from_millis(10),
    }
}

fn ifconfig_writes(mock: &MockSerialPort) -> usize {
    mock.get_write_log()
        .iter()
        .filter(|w| String::from_utf8_lossy(w).contains("ifconfig"))
        .count()
}

#[test]
fn test_get_ip_reads_inet_addr() {
    let mock = board_with_ifconfig(IFCONFIG_HEALTHY);
    let mut session = session_over(&mock);

    assert_eq!(session.get_ip().unwrap(), "192.168.1.5");
    assert!(mock.was_sent("\nifconfig\n"));
}

#[test]
fn test_get_ip_without_address_returns_sentinel() {
    let mock = board_with_ifconfig(IFCONFIG_NO_IP);
    let mut session = session_over(&mock);

    assert_eq!(session.get_ip().unwrap(), IP_NOT_FOUND);
    assert_eq!(IP_NOT_FOUND, "-1");
}

#[test]
fn test_get_network_err_within_limit() {
    let mock = board_with_ifconfig(IFCONFIG_HEALTHY);
    let mut session = session_over(&mock);

    assert!(session.get_network_err().unwrap());
}

#[test]
fn test_get_network_err_over_limit() {
    let mock = board_with_ifconfig(IFCONFIG_NOISY);
    let mut session = session_over(&mock);

    assert!(!session.get_network_err().unwrap());
}

#[test]
fn test_get_network_err_without_counter() {
    let mock = board_with_ifconfig("eth0 Link encap:Ethernet\r\n# ");
    let mut session = session_over(&mock);

    assert!(matches!(
        session.get_network_err(),
        Err(SessionError::MissingErrorCount)
    ));
}

#[test]
fn test_check_status_healthy_on_first_attempt() {
    let mock = board_with_ifconfig(IFCONFIG_HEALTHY);
    let mut session = session_over(&mock);

    let status = session.check_status(quick_retries(5)).unwrap();

    assert_eq!(status.ip, "192.168.1.5");
    assert_eq!(status.error_count, 15);
    assert_eq!(status.attempts, 1);
    assert_eq!(ifconfig_writes(&mock), 1);
}

#[test]
fn test_check_status_gives_up_after_max_attempts() {
    let mock = board_with_ifconfig(IFCONFIG_NOISY);
    let mut session = session_over(&mock);

    let err = session.check_status(quick_retries(3)).unwrap_err();

    match err {
        SessionError::StatusCheckExhausted {
            attempts,
            last_fault,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_fault.contains("25"), "fault: {last_fault}");
        }
        other => panic!("expected StatusCheckExhausted, got {other:?}"),
    }
    assert_eq!(ifconfig_writes(&mock), 3);
    assert!(session.is_open());
}

#[test]
fn test_check_status_recovers_after_dhcp() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_once("ifconfig", IFCONFIG_NO_IP.as_bytes());
    mock.respond_to("ifconfig", IFCONFIG_HEALTHY.as_bytes());
    let mut session = session_over(&mock);

    let status = session.check_status(quick_retries(5)).unwrap();

    assert_eq!(status.attempts, 2);
    assert_eq!(status.ip, "192.168.1.5");
}

#[test]
fn test_check_status_zero_attempts_still_probes_once() {
    let mock = board_with_ifconfig(IFCONFIG_NO_IP);
    let mut session = session_over(&mock);

    let err = session.check_status(quick_retries(0)).unwrap_err();

    assert!(matches!(
        err,
        SessionError::StatusCheckExhausted { attempts: 1, .. }
    ));
    assert_eq!(ifconfig_writes(&mock), 1);
}

#[test]
fn test_mount_nfs_skips_when_already_listed() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_to("ls", b"payload.bin  run.sh\r\n# ");
    let mut session = session_over(&mock);

    let outcome = session.mount_nfs("10.0.0.2", "/srv/nfs", "payload.bin").unwrap();

    assert_eq!(outcome, MountOutcome::AlreadyMounted);
    assert!(!mock.was_sent("mount -t nfs"));
}

#[test]
fn test_mount_nfs_mounts_and_lists() {
    let mut mock = MockSerialPort::new("MOCK0");
    // The mount command ends in ";ls", so its reply is registered first.
    mock.respond_to("mount -t nfs", b"payload.bin  run.sh\r\n# ");
    mock.respond_to("ls", b"bin  etc\r\n# ");
    let mut session = session_over(&mock);

    let outcome = session.mount_nfs("10.0.0.2", "/srv/nfs", "payload.bin").unwrap();

    assert_eq!(outcome, MountOutcome::Mounted);
    assert!(mock.was_sent(&format!("\n{MOUNT_CMD}\n")));
    assert!(session.is_open());
}

#[test]
fn test_mount_nfs_network_unreachable_closes_session() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_to(
        "mount -t nfs",
        b"mount: mounting 10.0.0.2:/srv/nfs on /mnt failed: Network is unreachable\r\n# ",
    );
    mock.respond_to("ls", b"bin  etc\r\n# ");
    let mut session = session_over(&mock);

    let err = session
        .mount_nfs("10.0.0.2", "/srv/nfs", "payload.bin")
        .unwrap_err();

    match err {
        SessionError::NetworkUnreachable { output } => {
            assert!(output.contains("Network is unreachable"));
        }
        other => panic!("expected NetworkUnreachable, got {other:?}"),
    }
    assert!(!session.is_open());
}

#[test]
fn test_mount_nfs_failure_closes_session() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_to(
        "mount -t nfs",
        b"mount: mounting 10.0.0.2:/srv/nfs on /mnt failed: Permission denied\r\n# ",
    );
    mock.respond_to("ls", b"bin  etc\r\n# ");
    let mut session = session_over(&mock);

    let err = session
        .mount_nfs("10.0.0.2", "/srv/nfs", "payload.bin")
        .unwrap_err();

    match err {
        SessionError::MountFailed { output } => assert!(output.contains("Permission denied")),
        other => panic!("expected MountFailed, got {other:?}"),
    }
    assert!(!session.is_open());
}

#[test]
fn test_mount_nfs_unconfirmed_keeps_session_open() {
    let mut mock = MockSerialPort::new("MOCK0");
    mock.respond_to("mount -t nfs", b"bin  etc\r\n# ");
    mock.respond_to("ls", b"bin  etc\r\n# ");
    let mut session = session_over(&mock);

    let outcome = session.mount_nfs("10.0.0.2", "/srv/nfs", "payload.bin").unwrap();

    assert_eq!(outcome, MountOutcome::Unconfirmed);
    assert!(session.is_open());
}

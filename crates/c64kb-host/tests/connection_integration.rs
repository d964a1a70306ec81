//! Integration tests for the serial connection lifecycle.
//!
//! # Purpose
//!
//! These tests drive `ConnectionManager` through its *public* API with the
//! scripted `MockSerialBackend` standing in for the USB serial port.  They
//! verify:
//!
//! - The handshake: the exact greeting bytes, and that a `c64` reply flips
//!   the state to `Connected` with exactly one `connected` event.
//! - Rebinding: `set_target` while connected yields exactly one
//!   `disconnected` event before the `connected` event for the new path.
//! - Device loss: unplugging the device is noticed on the next tick, fires
//!   one `disconnected` event, and no frame reaches the wire until the
//!   device is back.
//!
//! ```text
//! Host                                Keyboard controller
//! ────                                ───────────────────
//! open port @ 19200
//! write 03 'c' 'b' 'm', flush
//! wait settle time                    "c64\n"
//! read line == "c64" → Connected
//! write [len][codes…] per key event
//! ```

use std::sync::Arc;
use std::time::Duration;

use c64kb_host::infrastructure::serial::connection_manager::{
    ConnectionEvent, ConnectionManager, ConnectionState, LinkConfig,
};
use c64kb_host::infrastructure::serial::mock::MockSerialBackend;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const FIRST: &str = "/dev/ttyACM0";
const SECOND: &str = "/dev/ttyACM1";

fn test_config() -> LinkConfig {
    LinkConfig {
        settle_time: Duration::ZERO,
        read_timeout: Duration::from_millis(1),
        monitor_interval: Duration::from_millis(10),
        ..LinkConfig::default()
    }
}

fn manager_with(
    backend: &MockSerialBackend,
) -> (ConnectionManager, mpsc::Receiver<ConnectionEvent>) {
    ConnectionManager::new(test_config(), Arc::new(backend.clone()))
}

fn drain(rx: &mut mpsc::Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn connected(path: &str) -> ConnectionEvent {
    ConnectionEvent::Connected {
        path: path.to_string(),
    }
}

fn disconnected(path: &str) -> ConnectionEvent {
    ConnectionEvent::Disconnected {
        path: path.to_string(),
    }
}

// ── Handshake ─────────────────────────────────────────────────────────────────

#[test]
fn test_handshake_sends_greeting_and_connects_once() {
    // Arrange
    let backend = MockSerialBackend::with_device(FIRST);
    let (mgr, mut rx) = manager_with(&backend);
    mgr.set_target(Some(FIRST.to_string()));

    // Act
    mgr.tick();
    mgr.tick();

    // Assert
    assert_eq!(backend.writes(), vec![vec![0x03, b'c', b'b', b'm']]);
    assert_eq!(mgr.state(), ConnectionState::Connected);
    assert_eq!(drain(&mut rx), vec![connected(FIRST)]);
}

#[test]
fn test_wrong_reply_keeps_retrying_without_events() {
    let backend = MockSerialBackend::new();
    backend.add_port(FIRST);
    backend.set_greeting(&["vic20"]);
    let (mgr, mut rx) = manager_with(&backend);
    mgr.set_target(Some(FIRST.to_string()));

    mgr.tick();
    mgr.tick();

    assert_eq!(mgr.state(), ConnectionState::Disconnected);
    assert_eq!(backend.opened().len(), 2);
    assert!(drain(&mut rx).is_empty());
}

// ── Rebinding ─────────────────────────────────────────────────────────────────

#[test]
fn test_set_target_while_connected_disconnects_before_reconnecting() {
    // Arrange
    let backend = MockSerialBackend::with_device(FIRST);
    backend.add_port(SECOND);
    let (mgr, mut rx) = manager_with(&backend);
    mgr.set_target(Some(FIRST.to_string()));
    mgr.tick();

    // Act
    mgr.set_target(Some(SECOND.to_string()));
    let after_rebind = mgr.state();
    mgr.tick();

    // Assert: rebinding never connects inline
    assert_eq!(after_rebind, ConnectionState::Disconnected);
    assert_eq!(
        drain(&mut rx),
        vec![connected(FIRST), disconnected(FIRST), connected(SECOND)]
    );
    assert_eq!(backend.opened(), vec![FIRST.to_string(), SECOND.to_string()]);
}

#[test]
fn test_set_target_none_disconnects_and_stays_down() {
    let backend = MockSerialBackend::with_device(FIRST);
    let (mgr, mut rx) = manager_with(&backend);
    mgr.set_target(Some(FIRST.to_string()));
    mgr.tick();

    mgr.set_target(None);
    mgr.tick();

    assert!(!mgr.is_connected());
    assert_eq!(drain(&mut rx), vec![connected(FIRST), disconnected(FIRST)]);
}

// ── Device loss ───────────────────────────────────────────────────────────────

#[test]
fn test_unplugged_device_disconnects_once_and_blocks_frames() {
    // Arrange
    let backend = MockSerialBackend::with_device(FIRST);
    let (mgr, mut rx) = manager_with(&backend);
    mgr.set_target(Some(FIRST.to_string()));
    mgr.tick();
    backend.clear_writes();

    // Act
    backend.remove_port(FIRST);
    mgr.tick();
    let sent_while_down = mgr.send(&[0x8A]);
    mgr.tick();

    // Assert
    assert_eq!(sent_while_down, 0);
    assert!(backend.writes().is_empty());
    assert_eq!(drain(&mut rx), vec![connected(FIRST), disconnected(FIRST)]);
}

#[test]
fn test_replugged_device_reconnects_and_accepts_frames() {
    let backend = MockSerialBackend::with_device(FIRST);
    let (mgr, mut rx) = manager_with(&backend);
    mgr.set_target(Some(FIRST.to_string()));
    mgr.tick();
    backend.remove_port(FIRST);
    mgr.tick();

    backend.add_port(FIRST);
    mgr.tick();
    backend.clear_writes();
    let written = mgr.send(&[0x8A]);

    assert_eq!(written, 2);
    assert_eq!(backend.writes(), vec![vec![0x01, 0x8A]]);
    assert_eq!(
        drain(&mut rx),
        vec![connected(FIRST), disconnected(FIRST), connected(FIRST)]
    );
}

#[test]
fn test_write_failure_and_monitor_report_one_disconnect() {
    let backend = MockSerialBackend::with_device(FIRST);
    let (mgr, mut rx) = manager_with(&backend);
    mgr.set_target(Some(FIRST.to_string()));
    mgr.tick();

    backend.fail_writes(true);
    backend.remove_port(FIRST);
    mgr.send(&[0x8A]);
    mgr.tick();

    assert_eq!(drain(&mut rx), vec![connected(FIRST), disconnected(FIRST)]);
}

// ── Background monitor ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_monitor_recovers_after_device_returns() {
    // Arrange
    let backend = MockSerialBackend::with_device(FIRST);
    let (mgr, mut rx) = manager_with(&backend);
    mgr.set_target(Some(FIRST.to_string()));
    let cancel = CancellationToken::new();
    let monitor = mgr.spawn_monitor(cancel.clone());
    let timeout = Duration::from_secs(5);

    // Act / Assert
    let first = tokio::time::timeout(timeout, rx.recv()).await.unwrap();
    assert_eq!(first, Some(connected(FIRST)));

    backend.remove_port(FIRST);
    let lost = tokio::time::timeout(timeout, rx.recv()).await.unwrap();
    assert_eq!(lost, Some(disconnected(FIRST)));

    backend.add_port(FIRST);
    let back = tokio::time::timeout(timeout, rx.recv()).await.unwrap();
    assert_eq!(back, Some(connected(FIRST)));

    cancel.cancel();
    monitor.await.unwrap();
    mgr.close();
    assert!(!mgr.is_connected());
}

// ── Diagnostics ───────────────────────────────────────────────────────────────

#[test]
fn test_list_ports_reports_enumerated_devices() {
    let backend = MockSerialBackend::with_device(FIRST);
    backend.add_port(SECOND);
    let (mgr, _rx) = manager_with(&backend);

    let ports = tokio_test::assert_ok!(mgr.list_ports());

    let paths: Vec<&str> = ports.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(paths, vec![FIRST, SECOND]);
}

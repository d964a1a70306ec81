//! Integration tests for the key relay over a mocked serial link.
//!
//! These tests wire a real `KeyTranslator`, `KeyRelay` and
//! `ConnectionManager` together and check the exact bytes the keyboard
//! controller would receive for key events and typed text.

use std::sync::Arc;
use std::time::Duration;

use c64kb_core::{KeyConfig, KeyTranslator};
use c64kb_host::application::relay_keys::KeyRelay;
use c64kb_host::infrastructure::serial::connection_manager::{ConnectionManager, LinkConfig};
use c64kb_host::infrastructure::serial::mock::MockSerialBackend;

const PORT: &str = "/dev/ttyUSB0";

fn translator() -> Arc<KeyTranslator> {
    let config = KeyConfig::builder("English")
        .matrix_key("a", 10)
        .matrix_key("b", 28)
        .matrix_key("SHIFT_LEFT", 15)
        .matrix_key("RETURN", 1)
        .special_key("TEXT", 2)
        .special_key("RESET_MATRIX", 3)
        .mapping("Return", "RETURN")
        .build()
        .expect("valid layout");
    Arc::new(KeyTranslator::new(config))
}

/// A relay whose link is already connected, plus the backend to inspect.
fn connected_relay() -> (KeyRelay<ConnectionManager>, MockSerialBackend) {
    let backend = MockSerialBackend::with_device(PORT);
    let config = LinkConfig {
        settle_time: Duration::ZERO,
        ..LinkConfig::default()
    };
    let (manager, _rx) = ConnectionManager::new(config, Arc::new(backend.clone()));
    manager.set_target(Some(PORT.to_string()));
    manager.tick();
    assert!(manager.is_connected(), "mock device should connect");
    backend.clear_writes();

    (KeyRelay::new(manager, translator(), Duration::ZERO), backend)
}

#[test]
fn test_key_press_and_release_reach_the_wire() {
    // Arrange
    let (relay, backend) = connected_relay();

    // Act
    relay.press("A");
    relay.release("A");

    // Assert
    assert_eq!(
        backend.writes(),
        vec![vec![0x02, 0x8F, 0x8A], vec![0x02, 0x0F, 0x0A]]
    );
}

#[test]
fn test_aliased_key_is_resolved_before_sending() {
    let (relay, backend) = connected_relay();

    let outcome = relay.press("Return");

    assert_eq!(outcome.sent, 1);
    assert_eq!(backend.writes(), vec![vec![0x01, 0x81]]);
}

#[test]
fn test_typed_line_is_bracketed_by_text_mode() {
    let (relay, backend) = connected_relay();

    let outcome = relay.type_text("ab\n");

    assert_eq!(outcome.frames, 5);
    assert_eq!(outcome.sent, 5);
    assert_eq!(
        backend.writes(),
        vec![
            vec![0x01, 0xC2],
            vec![0x01, 0x8A],
            vec![0x01, 0x9C],
            vec![0x01, 0x81],
            vec![0x01, 0x42],
        ]
    );
}

#[test]
fn test_reset_matrix_sends_hide_all_signal() {
    let (relay, backend) = connected_relay();

    let outcome = relay.reset_matrix();

    assert!(outcome.hide_all_overlays);
    assert_eq!(backend.writes(), vec![vec![0x01, 0xC3]]);
}

#[test]
fn test_relay_drops_frames_while_link_is_down() {
    let (relay, backend) = connected_relay();
    backend.fail_writes(true);

    let first = relay.press("a");
    backend.fail_writes(false);
    let second = relay.press("b");

    assert_eq!(first.sent, 0);
    assert_eq!(second.sent, 0, "link stays down until the monitor reconnects");
    assert!(backend.writes().is_empty());
}

//! KeyRelay: turns host key events into frames on the serial link.
//!
//! The relay owns the current [`KeyTranslator`] and a [`FrameSink`].  Every
//! key press or release is translated and each resulting frame is handed to
//! the sink.  Text sequences (directives and pasted text) are paced with a
//! short delay between characters so the firmware keeps up.
//!
//! # Architecture
//!
//! The relay depends only on the `FrameSink` trait.  The serial
//! `ConnectionManager` implements it in the infrastructure layer; unit tests
//! inject a mock.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use c64kb_core::{KeyTranslator, MatrixFrame};
use tracing::{debug, info};

/// Special key that opens every matrix switch on the firmware side.
pub const RESET_MATRIX_KEY: &str = "RESET_MATRIX";

/// Destination for encoded matrix frames.
#[cfg_attr(test, mockall::automock)]
pub trait FrameSink: Send + Sync {
    /// Writes one frame payload; returns the bytes written, 0 if dropped.
    fn send_frame(&self, payload: &[u8]) -> usize;
}

/// What one relay call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Frames produced by the translator.
    pub frames: usize,
    /// Frames the sink accepted.
    pub sent: usize,
    /// Set when a frame carried the "hide all key overlays" signal.
    pub hide_all_overlays: bool,
}

/// Relays translated key events to a [`FrameSink`].
pub struct KeyRelay<S> {
    sink: S,
    translator: RwLock<Arc<KeyTranslator>>,
    char_delay: Duration,
}

impl<S: FrameSink> KeyRelay<S> {
    /// `char_delay` is the pause after each character of a text sequence.
    pub fn new(sink: S, translator: Arc<KeyTranslator>, char_delay: Duration) -> Self {
        Self {
            sink,
            translator: RwLock::new(translator),
            char_delay,
        }
    }

    /// The translator currently in use.
    pub fn translator(&self) -> Arc<KeyTranslator> {
        Arc::clone(&self.translator.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the translator, e.g. after a layout change.
    ///
    /// Calls already in progress finish with the old translator.
    pub fn set_translator(&self, translator: Arc<KeyTranslator>) {
        info!("keyboard layout switched to {}", translator.config().layout());
        *self
            .translator
            .write()
            .unwrap_or_else(PoisonError::into_inner) = translator;
    }

    pub fn press(&self, key: &str) -> RelayOutcome {
        self.relay_key(key, true)
    }

    pub fn release(&self, key: &str) -> RelayOutcome {
        self.relay_key(key, false)
    }

    /// Types host text, such as a pasted line, in text mode.
    ///
    /// Blocks for roughly one character delay per character.
    pub fn type_text(&self, text: &str) -> RelayOutcome {
        let frames = self.translator().translate_text(text);
        self.dispatch(&frames, true)
    }

    /// Sends the matrix reset, releasing anything the firmware still holds.
    pub fn reset_matrix(&self) -> RelayOutcome {
        let frame = self
            .translator()
            .combination_to_matrix(RESET_MATRIX_KEY, true);
        if frame.is_empty() {
            debug!("layout has no {RESET_MATRIX_KEY} key");
            return RelayOutcome::default();
        }
        self.dispatch(std::slice::from_ref(&frame), false)
    }

    fn relay_key(&self, key: &str, pressed: bool) -> RelayOutcome {
        debug!("key {}: {key}", if pressed { "pressed" } else { "released" });
        let frames = self.translator().translate(key, pressed);
        // More than one frame only comes from a text sequence.
        let paced = frames.len() > 1;
        self.dispatch(&frames, paced)
    }

    fn dispatch(&self, frames: &[MatrixFrame], paced: bool) -> RelayOutcome {
        let mut outcome = RelayOutcome {
            frames: frames.len(),
            ..RelayOutcome::default()
        };
        let last = frames.len().saturating_sub(1);

        for (i, frame) in frames.iter().enumerate() {
            outcome.hide_all_overlays |= frame.hides_all_overlays();
            if self.sink.send_frame(&frame.to_bytes()) > 0 {
                outcome.sent += 1;
            } else {
                debug!("frame {} not sent; link down", frame.hex_string());
            }
            // Pause after each character, not after entering or leaving
            // text mode.
            if paced && i > 0 && i < last && !self.char_delay.is_zero() {
                std::thread::sleep(self.char_delay);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use c64kb_core::KeyConfig;
    use mockall::predicate::eq;
    use std::sync::Mutex;

    // ── Test doubles ──────────────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingSink {
        frames: Mutex<Vec<Vec<u8>>>,
    }

    impl FrameSink for RecordingSink {
        fn send_frame(&self, payload: &[u8]) -> usize {
            self.frames.lock().unwrap().push(payload.to_vec());
            payload.len() + 1
        }
    }

    fn translator(layout: &str, a_code: u8) -> Arc<KeyTranslator> {
        let config = KeyConfig::builder(layout)
            .matrix_key("a", a_code)
            .matrix_key("b", 28)
            .matrix_key("SHIFT_LEFT", 15)
            .special_key("TEXT", 2)
            .special_key("RESET_MATRIX", 3)
            .mapping("F1", "CommandLine:ab")
            .build()
            .unwrap();
        Arc::new(KeyTranslator::new(config))
    }

    fn relay<S: FrameSink>(sink: S) -> KeyRelay<S> {
        KeyRelay::new(sink, translator("English", 10), Duration::ZERO)
    }

    // ── Tests ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_press_sends_single_frame() {
        // Arrange
        let mut sink = MockFrameSink::new();
        sink.expect_send_frame()
            .with(eq(vec![0x8A]))
            .times(1)
            .returning(|p| p.len() + 1);
        let relay = relay(sink);

        // Act
        let outcome = relay.press("a");

        // Assert
        assert_eq!(
            outcome,
            RelayOutcome {
                frames: 1,
                sent: 1,
                hide_all_overlays: false
            }
        );
    }

    #[test]
    fn test_release_sends_release_code() {
        let mut sink = MockFrameSink::new();
        sink.expect_send_frame()
            .with(eq(vec![0x0A]))
            .times(1)
            .returning(|p| p.len() + 1);

        relay(sink).release("a");
    }

    #[test]
    fn test_unknown_key_sends_nothing() {
        let mut sink = MockFrameSink::new();
        sink.expect_send_frame().never();

        let outcome = relay(sink).press("Hyper_L");

        assert_eq!(outcome, RelayOutcome::default());
    }

    #[test]
    fn test_dropped_frames_are_not_counted_as_sent() {
        let mut sink = MockFrameSink::new();
        sink.expect_send_frame().returning(|_| 0);

        let outcome = relay(sink).press("A");

        assert_eq!(outcome.frames, 1);
        assert_eq!(outcome.sent, 0);
    }

    #[test]
    fn test_directive_sends_text_sequence_in_order() {
        let relay = relay(RecordingSink::default());

        let outcome = relay.press("F1");

        assert_eq!(outcome.frames, 4);
        assert_eq!(
            *relay.sink.frames.lock().unwrap(),
            vec![vec![0xC2], vec![0x8A], vec![0x9C], vec![0x42]]
        );
    }

    #[test]
    fn test_type_text_paces_between_characters() {
        // Arrange
        let relay = KeyRelay::new(
            RecordingSink::default(),
            translator("English", 10),
            Duration::from_millis(20),
        );
        let started = std::time::Instant::now();

        // Act
        let outcome = relay.type_text("ab");

        // Assert: two character pauses, none around the text-mode frames
        assert_eq!(outcome.sent, 4);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_reset_matrix_reports_hide_all_overlays() {
        let mut sink = MockFrameSink::new();
        sink.expect_send_frame()
            .with(eq(vec![0xC3]))
            .times(1)
            .returning(|p| p.len() + 1);

        let outcome = relay(sink).reset_matrix();

        assert!(outcome.hide_all_overlays);
        assert_eq!(outcome.sent, 1);
    }

    #[test]
    fn test_set_translator_switches_layout() {
        let relay = relay(RecordingSink::default());

        relay.set_translator(translator("Swedish", 11));
        relay.press("a");

        assert_eq!(relay.translator().config().layout(), "Swedish");
        assert_eq!(*relay.sink.frames.lock().unwrap(), vec![vec![0x8B]]);
    }
}

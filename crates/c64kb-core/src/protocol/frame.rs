//! Length-prefixed frame codec.
//!
//! Wire format:
//! ```text
//! [len:1][payload:len]
//! ```
//! `len` is a single byte, so a payload carries at most 255 bytes.  The
//! firmware reads the length, then exactly that many scan codes, and applies
//! them to the matrix as one update.

use thiserror::Error;

use super::scancode::ScanCode;

/// Largest payload expressible by the one-byte length prefix.
pub const MAX_FRAME_PAYLOAD: usize = u8::MAX as usize;

/// Errors that can occur while framing or unframing a payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Frames must carry at least one byte.
    #[error("frame payload is empty")]
    Empty,

    /// The payload does not fit the one-byte length prefix.
    #[error("frame payload of {0} bytes exceeds the {MAX_FRAME_PAYLOAD}-byte limit")]
    TooLong(usize),

    /// The byte slice ends before the declared payload does.
    #[error("insufficient data: need {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },
}

/// Prefixes `payload` with its length byte.
///
/// # Errors
///
/// Returns [`FrameError::Empty`] for an empty payload and
/// [`FrameError::TooLong`] when it exceeds [`MAX_FRAME_PAYLOAD`].
///
/// # Examples
///
/// ```rust
/// use c64kb_core::encode_frame;
///
/// assert_eq!(encode_frame(&[0x8A]).unwrap(), vec![0x01, 0x8A]);
/// ```
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::Empty);
    }
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(FrameError::TooLong(payload.len()));
    }

    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(payload.len() as u8);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Splits one frame off the front of `bytes`, device-side view.
///
/// Returns the payload and the number of bytes consumed (prefix included).
///
/// # Errors
///
/// Returns [`FrameError::InsufficientData`] when `bytes` is shorter than the
/// prefix announces, and [`FrameError::Empty`] for a zero length prefix.
pub fn decode_frame(bytes: &[u8]) -> Result<(&[u8], usize), FrameError> {
    let Some(&len) = bytes.first() else {
        return Err(FrameError::InsufficientData {
            needed: 1,
            available: 0,
        });
    };
    if len == 0 {
        return Err(FrameError::Empty);
    }

    let total = 1 + len as usize;
    if bytes.len() < total {
        return Err(FrameError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }
    Ok((&bytes[1..total], total))
}

/// The scan codes of one matrix update, in send order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatrixFrame {
    codes: Vec<ScanCode>,
}

impl MatrixFrame {
    pub fn new(codes: Vec<ScanCode>) -> Self {
        Self { codes }
    }

    pub fn codes(&self) -> &[ScanCode] {
        &self.codes
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Raw payload bytes, without the length prefix.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.codes.iter().map(|c| c.raw()).collect()
    }

    /// `true` when any code in the frame is a "hide all overlays" hint.
    pub fn hides_all_overlays(&self) -> bool {
        self.codes.iter().any(|c| c.is_hide_all_signal())
    }

    /// Space-separated `0xNN` rendering used in debug logs.
    pub fn hex_string(&self) -> String {
        self.codes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<Vec<ScanCode>> for MatrixFrame {
    fn from(codes: Vec<ScanCode>) -> Self {
        Self::new(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame_prefixes_length() {
        let bytes = encode_frame(&[0x81, 0x0A]).unwrap();
        assert_eq!(bytes, vec![0x02, 0x81, 0x0A]);
    }

    #[test]
    fn test_encode_frame_rejects_empty_payload() {
        assert_eq!(encode_frame(&[]), Err(FrameError::Empty));
    }

    #[test]
    fn test_encode_frame_accepts_exactly_255_bytes() {
        let payload = vec![0x01; 255];
        let bytes = encode_frame(&payload).unwrap();
        assert_eq!(bytes[0], 0xFF);
        assert_eq!(bytes.len(), 256);
    }

    #[test]
    fn test_encode_frame_rejects_256_bytes() {
        let payload = vec![0x01; 256];
        assert_eq!(encode_frame(&payload), Err(FrameError::TooLong(256)));
    }

    #[test]
    fn test_decode_frame_reports_missing_bytes() {
        let result = decode_frame(&[0x03, 0x01]);
        assert_eq!(
            result,
            Err(FrameError::InsufficientData {
                needed: 4,
                available: 2
            })
        );
    }

    #[test]
    fn test_decode_frame_leaves_trailing_frames_untouched() {
        let buf = [0x01, 0x8A, 0x01, 0x0A];
        let (first, consumed) = decode_frame(&buf).unwrap();
        assert_eq!(first, &[0x8A]);
        let (second, _) = decode_frame(&buf[consumed..]).unwrap();
        assert_eq!(second, &[0x0A]);
    }

    #[test]
    fn test_matrix_frame_hex_string() {
        let frame = MatrixFrame::new(vec![ScanCode::from_raw(0x81), ScanCode::from_raw(0x0A)]);
        assert_eq!(frame.hex_string(), "0x81 0x0A");
        assert_eq!(frame.to_bytes(), vec![0x81, 0x0A]);
    }

    #[test]
    fn test_matrix_frame_detects_hide_all_hint() {
        let plain = MatrixFrame::new(vec![ScanCode::from_raw(0x8A)]);
        let reset = MatrixFrame::new(vec![ScanCode::from_raw(0xC3)]);
        assert!(!plain.hides_all_overlays());
        assert!(reset.hides_all_overlays());
    }
}

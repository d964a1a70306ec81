//! Serial wire protocol: scan-code bytes, length-prefixed frames, and the
//! handshake constants.
//!
//! ```text
//! handshake:  [0x03]['c']['b']['m']          host → device
//!             "c64\n"                         device → host
//! data frame: [len:1][scancode:1]{len}        host → device
//! ```
//!
//! The handshake greeting is itself a frame whose payload is `cbm`.

pub mod frame;
pub mod scancode;

pub use frame::{decode_frame, encode_frame, FrameError, MatrixFrame, MAX_FRAME_PAYLOAD};
pub use scancode::ScanCode;

/// Fixed serial line speed expected by the keyboard firmware.
pub const BAUD_RATE: u32 = 19_200;

/// Payload of the greeting frame sent by the host when opening the line.
pub const HANDSHAKE_GREETING: &[u8] = b"cbm";

/// Line the firmware answers with once it accepts the greeting.
pub const HANDSHAKE_REPLY: &str = "c64";

/// Returns the complete handshake byte sequence: `0x03 'c' 'b' 'm'`.
pub fn handshake_bytes() -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + HANDSHAKE_GREETING.len());
    buf.push(HANDSHAKE_GREETING.len() as u8);
    buf.extend_from_slice(HANDSHAKE_GREETING);
    buf
}

//! The one-byte scan code sent to the keyboard firmware.
//!
//! # Bit layout (for beginners)
//!
//! ```text
//!   7   6   5   4   3   2   1   0
//! ┌───┬───┬───────────────────────┐
//! │ P │ S │     matrix index      │
//! └───┴───┴───────────────────────┘
//! ```
//!
//! - **P** (0x80) – `1` when the cell is pressed, `0` when released.
//! - **S** (0x40) – `1` for *special* codes that are not matrix cells
//!   (RESTORE, matrix reset, text-mode markers).
//! - **index** (0x3F) – row × 8 + column on the C64 matrix, or the special
//!   code number when **S** is set.
//!
//! Two bit patterns double as display hints for an on-screen keyboard:
//! any code matching mask `0xC3` or mask `0x44` tells the UI to hide every
//! pressed-key overlay.

use std::fmt;

/// One scan-code byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScanCode(u8);

impl ScanCode {
    /// Press flag.
    pub const PRESSED: u8 = 0x80;
    /// Special-class marker.
    pub const SPECIAL: u8 = 0x40;
    /// Mask selecting the 6-bit index.
    pub const INDEX_MASK: u8 = 0x3F;

    /// Bit masks that signal "hide all key overlays" when every bit is set.
    pub const HIDE_ALL_MASKS: [u8; 2] = [0xC3, 0x44];

    /// Wraps a raw byte exactly as it appears on the wire.
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Builds a released matrix code.  Returns `None` above `0x3F`.
    pub const fn matrix(index: u8) -> Option<Self> {
        if index > Self::INDEX_MASK {
            None
        } else {
            Some(Self(index))
        }
    }

    /// Builds a released special code (index tagged with bit 6).
    /// Returns `None` above `0x3F`.
    pub const fn special(index: u8) -> Option<Self> {
        if index > Self::INDEX_MASK {
            None
        } else {
            Some(Self(index | Self::SPECIAL))
        }
    }

    /// Returns this code with the press flag set or cleared.
    #[must_use]
    pub const fn with_pressed(self, pressed: bool) -> Self {
        if pressed {
            Self(self.0 | Self::PRESSED)
        } else {
            Self(self.0 & !Self::PRESSED)
        }
    }

    /// Raw wire byte.
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// The code with the press flag stripped; identifies the key.
    pub const fn value(self) -> u8 {
        self.0 & !Self::PRESSED
    }

    /// The 6-bit matrix (or special) index.
    pub const fn index(self) -> u8 {
        self.0 & Self::INDEX_MASK
    }

    pub const fn is_pressed(self) -> bool {
        self.0 & Self::PRESSED != 0
    }

    pub const fn is_special(self) -> bool {
        self.0 & Self::SPECIAL != 0
    }

    /// `true` when the code is one of the reserved "hide all overlays" hints.
    pub fn is_hide_all_signal(self) -> bool {
        Self::HIDE_ALL_MASKS
            .iter()
            .any(|&mask| self.0 & mask == mask)
    }
}

impl From<ScanCode> for u8 {
    fn from(code: ScanCode) -> u8 {
        code.0
    }
}

impl fmt::Display for ScanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

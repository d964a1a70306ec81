//! # c64kb-core
//!
//! Shared library for the C64 keyboard relay containing the scan-code frame
//! codec, the key configuration tables, and the key-combination translator.
//!
//! This crate has zero dependencies on serial ports, UI frameworks, or the
//! file system.  Configuration documents arrive already read into memory.
//!
//! # Architecture overview (for beginners)
//!
//! A Commodore 64 keyboard is an 8×8 grid of switches (the *matrix*).  The
//! relay lets a modern host keyboard drive that grid through a small
//! microcontroller attached over a serial line.  Every host key event is
//! translated into one or more matrix cells that must be closed or opened
//! together.
//!
//! This crate defines:
//!
//! - **`protocol`** – How bytes travel over the serial line.  A scan code is
//!   one byte (press flag, special-class flag, 6-bit matrix index) and every
//!   update is sent as a length-prefixed frame.
//!
//! - **`keymap`** – The immutable lookup tables ([`KeyConfig`]) built from the
//!   keyboard-matrix and key-config JSON documents.
//!
//! - **`translate`** – The [`KeyTranslator`]: turns a host key name plus a
//!   press/release flag into the frames that realise it on the matrix,
//!   including alias resolution and the "type this text" mode.

pub mod keymap;
pub mod protocol;
pub mod translate;

// Re-export the most-used types at the crate root so callers can write
// `c64kb_core::KeyTranslator` instead of `c64kb_core::translate::KeyTranslator`.
pub use keymap::{KeyConfig, KeyConfigDocument, KeymapError, MatrixDocument};
pub use protocol::frame::{encode_frame, FrameError, MatrixFrame};
pub use protocol::scancode::ScanCode;
pub use translate::{Combination, KeyTranslator};

//! Typed views of the JSON configuration documents.
//!
//! Three document kinds exist on disk:
//!
//! ```json
//! // keyboard_matrix{_lang}.json
//! {
//!   "layout": "English",
//!   "matrix": { "a": 10, "RETURN": 1, "SHIFT_LEFT": 15 },
//!   "no-shift": ["="],
//!   "special-release-keys": { "Caps_Lock": "SHIFT_LOCK" },
//!   "key-mappings": { "Return": "RETURN" }
//! }
//!
//! // key_config.json
//! {
//!   "special-keys": { "TEXT": 2, "RESET_MATRIX": 3, "RESTORE": 1 },
//!   "key-mappings": { "F10": "LOAD_DIR" }
//! }
//!
//! // keyboard_layout/{model}{_lang}.json
//! { "type": "breadbin", "lang": "en", "name": "English", "keys": [ … ] }
//! ```
//!
//! Parsing only checks shape; value ranges are checked when a
//! [`super::KeyConfig`] is built.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::KeymapError;

/// The per-language keyboard-matrix document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MatrixDocument {
    /// Human-readable layout name, e.g. `"Swedish"`.
    pub layout: String,
    /// Key name → matrix index.
    pub matrix: HashMap<String, u8>,
    /// Keys whose shift state must be forced off.
    #[serde(default)]
    pub no_shift: Vec<String>,
    /// Key name → extra key released together with it.
    #[serde(default)]
    pub special_release_keys: HashMap<String, String>,
    /// Layout-specific aliases; they override the shared ones.
    #[serde(default)]
    pub key_mappings: HashMap<String, String>,
}

impl MatrixDocument {
    /// Parses the document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`KeymapError::Json`] if the text is not a valid document.
    pub fn from_json(text: &str) -> Result<Self, KeymapError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// The shared key-config document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KeyConfigDocument {
    /// Special key name → special index (bit 6 is added when building).
    #[serde(default)]
    pub special_keys: HashMap<String, u8>,
    /// Aliases shared by every layout.
    #[serde(default)]
    pub key_mappings: HashMap<String, String>,
}

impl KeyConfigDocument {
    /// Parses the document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`KeymapError::Json`] if the text is not a valid document.
    pub fn from_json(text: &str) -> Result<Self, KeymapError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Summary of an on-screen layout descriptor.  The per-key overlay list is
/// UI data and is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDescriptor {
    /// Machine model, e.g. `"breadbin"` or `"c64c"`.
    #[serde(rename = "type")]
    pub model: String,
    /// Language code, e.g. `"en"` or `"sv"`.
    pub lang: String,
    /// Display name, e.g. `"Swedish"`.
    pub name: String,
}

impl LayoutDescriptor {
    /// Parses the descriptor from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`KeymapError::Json`] if required fields are missing.
    pub fn from_json(text: &str) -> Result<Self, KeymapError> {
        Ok(serde_json::from_str(text)?)
    }
}

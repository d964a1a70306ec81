//! Key configuration tables.
//!
//! A [`KeyConfig`] is the merged, validated form of one keyboard-matrix
//! document plus the shared key-config document.  It is immutable: a layout
//! change builds a fresh instance and the old one is dropped, so a
//! translation in flight never observes a half-applied layout.

pub mod document;

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::warn;

use crate::protocol::scancode::ScanCode;

pub use document::{KeyConfigDocument, LayoutDescriptor, MatrixDocument};

/// Errors raised while parsing or validating key configuration.
#[derive(Debug, Error)]
pub enum KeymapError {
    /// The JSON text does not match the document shape.
    #[error("malformed key configuration document: {0}")]
    Json(#[from] serde_json::Error),

    /// A matrix position lies outside the 6-bit index range.
    #[error("matrix code {code:#04x} for key {key:?} exceeds 0x3F")]
    MatrixCodeOutOfRange { key: String, code: u8 },

    /// A special code lies outside the 6-bit index range.
    #[error("special code {code:#04x} for key {key:?} exceeds 0x3F")]
    SpecialCodeOutOfRange { key: String, code: u8 },
}

/// Immutable lookup tables for one keyboard layout.
#[derive(Debug, Clone, Default)]
pub struct KeyConfig {
    layout: String,
    matrix: HashMap<String, ScanCode>,
    no_shift: HashSet<String>,
    special_keys: HashMap<String, ScanCode>,
    special_release_keys: HashMap<String, String>,
    key_mappings: HashMap<String, String>,
}

impl KeyConfig {
    /// Starts an empty builder for the named layout.
    pub fn builder(layout: impl Into<String>) -> KeyConfigBuilder {
        KeyConfigBuilder::new(layout)
    }

    /// Merges the two configuration documents.
    ///
    /// Aliases from the matrix document override shared aliases with the
    /// same key.
    ///
    /// # Errors
    ///
    /// Returns [`KeymapError::MatrixCodeOutOfRange`] or
    /// [`KeymapError::SpecialCodeOutOfRange`] for codes above `0x3F`.
    pub fn from_documents(
        matrix_doc: &MatrixDocument,
        key_doc: &KeyConfigDocument,
    ) -> Result<Self, KeymapError> {
        let mut builder = Self::builder(matrix_doc.layout.clone());

        for (key, &code) in &matrix_doc.matrix {
            builder = builder.matrix_key(key.clone(), code);
        }
        for key in &matrix_doc.no_shift {
            builder = builder.no_shift(key.clone());
        }
        for (key, extra) in &matrix_doc.special_release_keys {
            builder = builder.release_key(key.clone(), extra.clone());
        }
        for (key, &code) in &key_doc.special_keys {
            builder = builder.special_key(key.clone(), code);
        }
        // Shared aliases first so layout aliases win on conflict.
        for (key, alias) in key_doc.key_mappings.iter().chain(&matrix_doc.key_mappings) {
            builder = builder.mapping(key.clone(), alias.clone());
        }

        builder.build()
    }

    /// Human-readable layout name.
    pub fn layout(&self) -> &str {
        &self.layout
    }

    /// Released matrix code for `key`, if it is a matrix key.
    pub fn matrix_code(&self, key: &str) -> Option<ScanCode> {
        self.matrix.get(key).copied()
    }

    /// Released special code (bit 6 set) for `key`, if it is a special key.
    pub fn special_code(&self, key: &str) -> Option<ScanCode> {
        self.special_keys.get(key).copied()
    }

    /// Matrix lookup first, then special lookup.
    pub fn resolve_term(&self, key: &str) -> Option<ScanCode> {
        self.matrix_code(key).or_else(|| self.special_code(key))
    }

    pub fn is_matrix_key(&self, key: &str) -> bool {
        self.matrix.contains_key(key)
    }

    pub fn is_no_shift(&self, key: &str) -> bool {
        self.no_shift.contains(key)
    }

    /// Extra key to release alongside `key`.
    pub fn release_key(&self, key: &str) -> Option<&str> {
        self.special_release_keys.get(key).map(String::as_str)
    }

    /// Alias expression mapped to `key`.
    pub fn mapping(&self, key: &str) -> Option<&str> {
        self.key_mappings.get(key).map(String::as_str)
    }

    /// Number of matrix keys; used in load diagnostics.
    pub fn matrix_len(&self) -> usize {
        self.matrix.len()
    }
}

/// Incremental builder for [`KeyConfig`].
///
/// Raw codes are validated in [`KeyConfigBuilder::build`] so a malformed
/// entry is reported with its key name.
#[derive(Debug, Default)]
pub struct KeyConfigBuilder {
    layout: String,
    matrix: Vec<(String, u8)>,
    no_shift: Vec<String>,
    special_keys: Vec<(String, u8)>,
    special_release_keys: HashMap<String, String>,
    key_mappings: HashMap<String, String>,
}

impl KeyConfigBuilder {
    pub fn new(layout: impl Into<String>) -> Self {
        Self {
            layout: layout.into(),
            ..Self::default()
        }
    }

    pub fn matrix_key(mut self, key: impl Into<String>, code: u8) -> Self {
        self.matrix.push((key.into(), code));
        self
    }

    pub fn no_shift(mut self, key: impl Into<String>) -> Self {
        self.no_shift.push(key.into());
        self
    }

    pub fn special_key(mut self, key: impl Into<String>, code: u8) -> Self {
        self.special_keys.push((key.into(), code));
        self
    }

    pub fn release_key(mut self, key: impl Into<String>, extra: impl Into<String>) -> Self {
        self.special_release_keys.insert(key.into(), extra.into());
        self
    }

    /// Adds an alias; a later call for the same key replaces the earlier one.
    pub fn mapping(mut self, key: impl Into<String>, alias: impl Into<String>) -> Self {
        self.key_mappings.insert(key.into(), alias.into());
        self
    }

    /// Validates the collected entries.
    ///
    /// # Errors
    ///
    /// Returns [`KeymapError`] if any matrix or special code exceeds `0x3F`.
    pub fn build(self) -> Result<KeyConfig, KeymapError> {
        let mut matrix = HashMap::with_capacity(self.matrix.len());
        for (key, code) in self.matrix {
            let scan = ScanCode::matrix(code)
                .ok_or_else(|| KeymapError::MatrixCodeOutOfRange { key: key.clone(), code })?;
            matrix.insert(key, scan);
        }

        let mut special_keys = HashMap::with_capacity(self.special_keys.len());
        for (key, code) in self.special_keys {
            let scan = ScanCode::special(code)
                .ok_or_else(|| KeymapError::SpecialCodeOutOfRange { key: key.clone(), code })?;
            special_keys.insert(key, scan);
        }

        let mut no_shift = HashSet::with_capacity(self.no_shift.len());
        for key in self.no_shift {
            if matrix.contains_key(&key) {
                no_shift.insert(key);
            } else {
                warn!("no-shift entry {key:?} is not a matrix key; ignoring");
            }
        }

        Ok(KeyConfig {
            layout: self.layout,
            matrix,
            no_shift,
            special_keys,
            special_release_keys: self.special_release_keys,
            key_mappings: self.key_mappings,
        })
    }
}

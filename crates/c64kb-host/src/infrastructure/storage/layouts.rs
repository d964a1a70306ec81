//! Loads keyboard layouts from the keyboard configuration directory.
//!
//! ```text
//! config/
//! ├── key_config.json              shared special keys and aliases
//! ├── keyboard_matrix.json         English matrix
//! ├── keyboard_matrix_sv.json      Swedish matrix, one file per language
//! └── keyboard_layout/
//!     ├── breadbin.json            descriptors: { "type", "lang", "name", … }
//!     └── c64c_sv.json
//! ```

use std::path::{Path, PathBuf};

use c64kb_core::keymap::{
    KeyConfig, KeyConfigDocument, KeymapError, LayoutDescriptor, MatrixDocument,
};
use thiserror::Error;
use tracing::{info, warn};

const KEY_CONFIG_FILE: &str = "key_config.json";
const MATRIX_FILE_STEM: &str = "keyboard_matrix";
const LAYOUT_DIR: &str = "keyboard_layout";

/// Error type for loading key configuration files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid key configuration in {path}: {source}")]
    Keymap {
        path: PathBuf,
        #[source]
        source: KeymapError,
    },
}

/// Reads key configuration documents from one directory.
#[derive(Debug, Clone)]
pub struct LayoutStore {
    dir: PathBuf,
}

impl LayoutStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key_config_path(&self) -> PathBuf {
        self.dir.join(KEY_CONFIG_FILE)
    }

    /// Matrix document for `lang`; English has no suffix.
    pub fn matrix_path(&self, lang: &str) -> PathBuf {
        let name = match lang {
            "" | "en" => format!("{MATRIX_FILE_STEM}.json"),
            other => format!("{MATRIX_FILE_STEM}_{other}.json"),
        };
        self.dir.join(name)
    }

    /// Builds the [`KeyConfig`] for `lang` from the matrix and shared
    /// documents.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Io`] if a file cannot be read and
    /// [`LoadError::Keymap`] if a document is malformed or out of range.
    pub fn load_key_config(&self, lang: &str) -> Result<KeyConfig, LoadError> {
        let matrix_path = self.matrix_path(lang);
        let matrix_doc: MatrixDocument = read_document(&matrix_path, MatrixDocument::from_json)?;

        let key_path = self.key_config_path();
        let key_doc: KeyConfigDocument = read_document(&key_path, KeyConfigDocument::from_json)?;

        let config = KeyConfig::from_documents(&matrix_doc, &key_doc).map_err(|source| {
            LoadError::Keymap {
                path: matrix_path.clone(),
                source,
            }
        })?;
        info!(
            "loaded layout {} ({} matrix keys) from {}",
            config.layout(),
            config.matrix_len(),
            matrix_path.display()
        );
        Ok(config)
    }

    /// Lists the layout descriptors, sorted by model then language.
    ///
    /// Files that fail to parse are skipped with a warning.  A missing
    /// `keyboard_layout/` directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Io`] if the directory exists but cannot be read.
    pub fn list_layouts(&self) -> Result<Vec<LayoutDescriptor>, LoadError> {
        let dir = self.dir.join(LAYOUT_DIR);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(LoadError::Io { path: dir, source }),
        };

        let mut layouts = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| LoadError::Io {
                    path: dir.clone(),
                    source,
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_document(&path, LayoutDescriptor::from_json) {
                Ok(layout) => layouts.push(layout),
                Err(e) => warn!("skipping layout descriptor: {e}"),
            }
        }
        layouts.sort_by(|a, b| (&a.model, &a.lang).cmp(&(&b.model, &b.lang)));
        Ok(layouts)
    }

    /// Finds the descriptor for `model` and `lang`.  An empty `lang` matches
    /// English.
    ///
    /// # Errors
    ///
    /// Same as [`LayoutStore::list_layouts`].
    pub fn find_layout(
        &self,
        model: &str,
        lang: &str,
    ) -> Result<Option<LayoutDescriptor>, LoadError> {
        let lang = if lang.is_empty() { "en" } else { lang };
        Ok(self
            .list_layouts()?
            .into_iter()
            .find(|l| l.model == model && l.lang == lang))
    }
}

fn read_document<T>(
    path: &Path,
    parse: fn(&str) -> Result<T, KeymapError>,
) -> Result<T, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text).map_err(|source| LoadError::Keymap {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempConfigDir(PathBuf);

    impl TempConfigDir {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "c64kb_layouts_{tag}_{}",
                std::process::id()
            ));
            std::fs::create_dir_all(dir.join(LAYOUT_DIR)).unwrap();
            Self(dir)
        }

        fn write(&self, name: &str, content: &str) {
            std::fs::write(self.0.join(name), content).unwrap();
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.0).ok();
        }
    }

    const KEY_CONFIG: &str = r#"{ "special-keys": { "TEXT": 2 }, "key-mappings": {} }"#;

    #[test]
    fn test_matrix_path_omits_english_suffix() {
        let store = LayoutStore::new("config");
        assert_eq!(store.matrix_path(""), PathBuf::from("config/keyboard_matrix.json"));
        assert_eq!(store.matrix_path("en"), PathBuf::from("config/keyboard_matrix.json"));
        assert_eq!(store.matrix_path("sv"), PathBuf::from("config/keyboard_matrix_sv.json"));
    }

    #[test]
    fn test_load_key_config_merges_documents() {
        // Arrange
        let dir = TempConfigDir::new("merge");
        dir.write("key_config.json", KEY_CONFIG);
        dir.write(
            "keyboard_matrix_sv.json",
            r#"{ "layout": "Swedish", "matrix": { "a": 10 }, "no-shift": [], "key-mappings": {} }"#,
        );
        let store = LayoutStore::new(&dir.0);

        // Act
        let config = store.load_key_config("sv").unwrap();

        // Assert
        assert_eq!(config.layout(), "Swedish");
        assert!(config.is_matrix_key("a"));
        assert!(config.special_code("TEXT").is_some());
    }

    #[test]
    fn test_load_key_config_missing_file_is_io_error() {
        let dir = TempConfigDir::new("missing");
        let store = LayoutStore::new(&dir.0);

        let result = store.load_key_config("");

        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[test]
    fn test_load_key_config_out_of_range_code_is_keymap_error() {
        let dir = TempConfigDir::new("range");
        dir.write("key_config.json", KEY_CONFIG);
        dir.write(
            "keyboard_matrix.json",
            r#"{ "layout": "English", "matrix": { "a": 99 } }"#,
        );

        let result = LayoutStore::new(&dir.0).load_key_config("en");

        assert!(matches!(
            result,
            Err(LoadError::Keymap {
                source: KeymapError::MatrixCodeOutOfRange { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_list_layouts_sorts_and_skips_malformed() {
        // Arrange
        let dir = TempConfigDir::new("list");
        dir.write(
            "keyboard_layout/c64c_sv.json",
            r#"{ "type": "c64c", "lang": "sv", "name": "Swedish", "keys": [] }"#,
        );
        dir.write(
            "keyboard_layout/breadbin.json",
            r#"{ "type": "breadbin", "lang": "en", "name": "English", "keys": [] }"#,
        );
        dir.write("keyboard_layout/broken.json", "{ nope");
        dir.write("keyboard_layout/readme.txt", "not a layout");
        let store = LayoutStore::new(&dir.0);

        // Act
        let layouts = store.list_layouts().unwrap();

        // Assert
        let names: Vec<&str> = layouts.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["English", "Swedish"]);
        assert_eq!(
            store.find_layout("breadbin", "").unwrap().map(|l| l.name),
            Some("English".to_string())
        );
        assert_eq!(store.find_layout("c64c", "de").unwrap(), None);
    }

    #[test]
    fn test_list_layouts_without_directory_is_empty() {
        let store = LayoutStore::new("/nonexistent/c64kb/config");
        assert!(store.list_layouts().unwrap().is_empty());
    }
}

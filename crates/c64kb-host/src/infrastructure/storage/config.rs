//! TOML-based configuration persistence for the host relay.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\C64Keyboard\config.toml`
//! - Linux:    `~/.config/c64keyboard/config.toml`
//! - macOS:    `~/Library/Application Support/C64Keyboard/config.toml`
//!
//! Example:
//!
//! ```toml
//! [app]
//! log_level = "debug"
//!
//! [device]
//! path = "/dev/ttyACM0"
//!
//! [keyboard]
//! config_dir = "/usr/share/c64keyboard/config"
//! lang = "sv"
//! ```
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default = "…")]` so a missing file, a missing
//! section, or a file written by an older version all load cleanly.

use std::path::PathBuf;
use std::time::Duration;

use c64kb_core::protocol::BAUD_RATE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::serial::connection_manager::LinkConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub keyboard: KeyboardConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSettings {
    /// Schema version string; bump when breaking changes are introduced.
    #[serde(default = "default_version")]
    pub version: String,
    /// `tracing` log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Serial link settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Device path of the keyboard controller.  Without it the relay runs
    /// but never connects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Wait between the greeting and reading the reply.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
}

/// Keyboard layout settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyboardConfig {
    /// Directory holding `key_config.json`, the matrix documents and
    /// `keyboard_layout/`.
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// Machine model shown by the layout descriptors: `breadbin` or `c64c`.
    #[serde(default = "default_model")]
    pub model: String,
    /// Layout language; empty or `en` selects the English matrix.
    #[serde(default)]
    pub lang: String,
    /// Pause between characters when typing text.
    #[serde(default = "default_text_char_delay_ms")]
    pub text_char_delay_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_version() -> String {
    "1.0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_baud_rate() -> u32 {
    BAUD_RATE
}
fn default_read_timeout_ms() -> u64 {
    100
}
fn default_settle_ms() -> u64 {
    1000
}
fn default_monitor_interval_ms() -> u64 {
    1000
}
fn default_config_dir() -> PathBuf {
    PathBuf::from("config")
}
fn default_model() -> String {
    "breadbin".to_string()
}
fn default_text_char_delay_ms() -> u64 {
    50
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: default_version(),
            log_level: default_log_level(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: None,
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            settle_ms: default_settle_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
        }
    }
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            model: default_model(),
            lang: String::new(),
            text_char_delay_ms: default_text_char_delay_ms(),
        }
    }
}

impl DeviceConfig {
    /// Link timings for the connection manager.
    ///
    /// The monitor interval is at least one millisecond; a zero period
    /// would spin.
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            settle_time: Duration::from_millis(self.settle_ms),
            monitor_interval: Duration::from_millis(self.monitor_interval_ms.max(1)),
            ..LinkConfig::default()
        }
    }
}

impl KeyboardConfig {
    pub fn text_char_delay(&self) -> Duration {
        Duration::from_millis(self.text_char_delay_ms)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from disk, returning `AppConfig::default()` if the file
/// does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(config_file_path()?)
}

/// Loads `AppConfig` from an explicit path.  A missing file yields defaults.
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_from(path: PathBuf) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Same as [`save_config`].
pub fn save_config_to(config: &AppConfig, path: PathBuf) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io { path, source })?;
    Ok(())
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("C64Keyboard"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("c64keyboard"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("C64Keyboard")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

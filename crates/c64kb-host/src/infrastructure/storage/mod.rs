//! Storage infrastructure: configuration file persistence.
//!
//! - **`config`** reads and writes the TOML app config from the platform
//!   config directory and falls back to defaults on first run.
//! - **`layouts`** reads the JSON key-configuration documents from the
//!   keyboard configuration directory and lists the available layouts.

pub mod config;
pub mod layouts;

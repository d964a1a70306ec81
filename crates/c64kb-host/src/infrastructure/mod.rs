//! Infrastructure layer for the host relay.
//!
//! Contains OS-facing adapters: the serial link to the keyboard controller
//! and file-system storage for the app config and key configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `c64kb_core`, but MUST NOT be imported by the `application` layer.

pub mod serial;
pub mod storage;

//! Application layer use cases for the host relay.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (here: the pure translator in `c64kb_core`) and the infrastructure
//! (serial ports, files).  Use cases in this layer orchestrate domain
//! objects and talk to the outside world only through traits, so tests can
//! substitute mocks.
//!
//! # Sub-modules
//!
//! - **`relay_keys`** – Turns host key events and pasted text into matrix
//!   frames and hands them to a [`relay_keys::FrameSink`].  Runs on every
//!   keystroke.

pub mod relay_keys;

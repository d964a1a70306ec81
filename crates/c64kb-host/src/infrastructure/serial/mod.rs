//! Serial link infrastructure.
//!
//! The keyboard controller is an Arduino-class board on a USB serial port.
//! Everything the host knows about it goes through two small traits:
//!
//! - [`SerialBackend`] enumerates ports and opens one.
//! - [`SerialLine`] is one open port: framed writes out, text lines in.
//!
//! The production backend wraps the `serialport` crate.  Tests use the
//! scripted [`mock::MockSerialBackend`], so the connection state machine is
//! exercised without hardware.
//!
//! # Sub-modules
//!
//! - **`connection_manager`** – The handshake, the monitor loop and the
//!   reconnect state machine.
//! - **`mock`** – Scripted backend for tests.

use std::io::{self, Read, Write};
use std::time::Duration;

use thiserror::Error;

pub mod connection_manager;
pub mod mock;

/// Longest run of bytes without a newline kept before it is returned as a
/// line anyway.
const MAX_PENDING_LINE: usize = 1024;

/// Error type for serial link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The operating system could not enumerate serial ports.
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(#[source] serialport::Error),

    /// The port exists but could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    /// The configured device is not among the enumerated ports.
    #[error("device {path} not found")]
    NotPresent { path: String },

    /// A read, write or flush failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The device never answered the handshake.
    #[error("no handshake reply from {path}")]
    NoReply { path: String },
}

/// One enumerated serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// OS device path, e.g. `/dev/ttyACM0` or `COM3`.
    pub path: String,
    /// Human-readable description.
    pub description: String,
}

/// An open serial port.
///
/// Reads are bounded by the timeout the port was opened with.
pub trait SerialLine: Send {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Returns the next complete line without its terminator.
    ///
    /// `Ok(None)` means no complete line arrived within the timeout; any
    /// partial line is kept for the next call.
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Port enumeration and opening.
pub trait SerialBackend: Send + Sync {
    fn available_ports(&self) -> Result<Vec<PortInfo>, LinkError>;

    fn open(
        &self,
        path: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialLine>, LinkError>;
}

/// [`SerialBackend`] on top of the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerialBackend;

impl SerialBackend for SystemSerialBackend {
    fn available_ports(&self) -> Result<Vec<PortInfo>, LinkError> {
        let ports = serialport::available_ports().map_err(LinkError::Enumerate)?;
        Ok(ports
            .into_iter()
            .map(|p| PortInfo {
                description: describe_port(&p.port_type),
                path: p.port_name,
            })
            .collect())
    }

    fn open(
        &self,
        path: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialLine>, LinkError> {
        let port = serialport::new(path, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|source| LinkError::Open {
                path: path.to_string(),
                source,
            })?;
        Ok(Box::new(SystemSerialLine {
            port,
            pending: Vec::new(),
        }))
    }
}

fn describe_port(port_type: &serialport::SerialPortType) -> String {
    match port_type {
        serialport::SerialPortType::UsbPort(usb) => usb
            .product
            .clone()
            .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid)),
        serialport::SerialPortType::PciPort => "PCI".to_string(),
        serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        serialport::SerialPortType::Unknown => "n/a".to_string(),
    }
}

/// An open `serialport` handle plus the bytes of a not-yet-complete line.
struct SystemSerialLine {
    port: Box<dyn serialport::SerialPort>,
    pending: Vec<u8>,
}

impl SerialLine for SystemSerialLine {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut chunk = [0u8; 256];
        loop {
            if let Some(line) = take_line(&mut self.pending) {
                return Ok(Some(line));
            }
            match self.port.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    return Ok(None)
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Removes the first newline-terminated line from `pending`.
///
/// A run longer than [`MAX_PENDING_LINE`] without a newline is returned as
/// a line so a device that never sends one cannot grow the buffer.
fn take_line(pending: &mut Vec<u8>) -> Option<String> {
    let end = match pending.iter().position(|&b| b == b'\n') {
        Some(pos) => pos + 1,
        None if pending.len() >= MAX_PENDING_LINE => capped_line_end(pending),
        None => return None,
    };
    let raw: Vec<u8> = pending.drain(..end).collect();
    let text = String::from_utf8_lossy(&raw);
    Some(text.trim_end_matches(['\r', '\n']).to_string())
}

/// Cut point for a capped line, moved back so a multi-byte UTF-8 character
/// is not split.  Falls back to the cap when no boundary is found.
fn capped_line_end(pending: &[u8]) -> usize {
    let is_continuation = |b: u8| b & 0xC0 == 0x80;
    (1..=MAX_PENDING_LINE)
        .rev()
        .find(|&end| pending.get(end).map_or(true, |&b| !is_continuation(b)))
        .unwrap_or(MAX_PENDING_LINE)
}

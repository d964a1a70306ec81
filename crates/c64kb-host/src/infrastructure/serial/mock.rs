//! Scripted serial backend for testing.
//!
//! Lets tests control which ports are enumerated, what the device answers,
//! and when I/O fails, and inspect every byte the host wrote, without a
//! physical keyboard controller.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use c64kb_core::protocol::HANDSHAKE_REPLY;

use super::{LinkError, PortInfo, SerialBackend, SerialLine};

#[derive(Debug, Default)]
struct MockState {
    ports: Vec<PortInfo>,
    greeting: Vec<String>,
    incoming: VecDeque<String>,
    writes: Vec<Vec<u8>>,
    opened: Vec<String>,
    fail_open: bool,
    fail_writes: bool,
    fail_reads: bool,
}

/// A [`SerialBackend`] whose behaviour is scripted by the test.
///
/// Clones share state, so a test can keep one handle and give another to
/// the connection manager.
#[derive(Debug, Clone, Default)]
pub struct MockSerialBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialBackend {
    /// Creates a backend with no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with one port whose device answers the handshake.
    pub fn with_device(path: &str) -> Self {
        let backend = Self::new();
        backend.add_port(path);
        backend.set_greeting(&[HANDSHAKE_REPLY]);
        backend
    }

    /// Makes `path` appear in the enumerated port list.
    pub fn add_port(&self, path: &str) {
        let mut state = self.state.lock().expect("lock poisoned");
        if !state.ports.iter().any(|p| p.path == path) {
            state.ports.push(PortInfo {
                path: path.to_string(),
                description: "mock device".to_string(),
            });
        }
    }

    /// Removes `path` from the enumerated port list, as if unplugged.
    pub fn remove_port(&self, path: &str) {
        self.state
            .lock()
            .expect("lock poisoned")
            .ports
            .retain(|p| p.path != path);
    }

    /// Lines the device sends each time a port is opened.
    pub fn set_greeting(&self, lines: &[&str]) {
        self.state.lock().expect("lock poisoned").greeting =
            lines.iter().map(|l| l.to_string()).collect();
    }

    /// Queues a line for the next `read_line` on the open port.
    pub fn push_line(&self, line: &str) {
        self.state
            .lock()
            .expect("lock poisoned")
            .incoming
            .push_back(line.to_string());
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.lock().expect("lock poisoned").fail_open = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().expect("lock poisoned").fail_writes = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().expect("lock poisoned").fail_reads = fail;
    }

    /// Every buffer passed to `write_all`, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().expect("lock poisoned").writes.clone()
    }

    /// Forgets the recorded writes.
    pub fn clear_writes(&self) {
        self.state.lock().expect("lock poisoned").writes.clear();
    }

    /// Paths passed to `open`, in order.
    pub fn opened(&self) -> Vec<String> {
        self.state.lock().expect("lock poisoned").opened.clone()
    }
}

impl SerialBackend for MockSerialBackend {
    fn available_ports(&self) -> Result<Vec<PortInfo>, LinkError> {
        Ok(self.state.lock().expect("lock poisoned").ports.clone())
    }

    fn open(
        &self,
        path: &str,
        _baud_rate: u32,
        _read_timeout: Duration,
    ) -> Result<Box<dyn SerialLine>, LinkError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.opened.push(path.to_string());
        if state.fail_open {
            return Err(LinkError::Open {
                path: path.to_string(),
                source: serialport::Error::new(
                    serialport::ErrorKind::NoDevice,
                    "scripted open failure",
                ),
            });
        }
        state.incoming.clear();
        let greeting = state.greeting.clone();
        state.incoming.extend(greeting);
        Ok(Box::new(MockSerialLine {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockSerialLine {
    state: Arc<Mutex<MockState>>,
}

fn scripted_failure(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, format!("scripted {what} failure"))
}

impl SerialLine for MockSerialLine {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.fail_writes {
            return Err(scripted_failure("write"));
        }
        state.writes.push(bytes.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.state.lock().expect("lock poisoned").fail_writes {
            return Err(scripted_failure("flush"));
        }
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.fail_reads {
            return Err(scripted_failure("read"));
        }
        Ok(state.incoming.pop_front())
    }
}

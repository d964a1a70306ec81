//! ConnectionManager: owns the serial link to the keyboard controller.
//!
//! # State machine
//!
//! ```text
//!              monitor tick, device enumerated
//! Disconnected ───────────────────────────────► Connecting
//!      ▲  ▲                                        │
//!      │  └──── no reply / open failed ────────────┤
//!      │                                           │ "c64" received
//!      │   I/O error, device unplugged,            ▼
//!      └────────── set_target ──────────────── Connected
//! ```
//!
//! The manager never gives up: while a target path is configured and the
//! link is down, every monitor tick retries the handshake.
//!
//! # Threading
//!
//! Serial I/O is blocking.  [`ConnectionManager::tick`], [`send`] and
//! [`readline`] are plain synchronous calls meant for a blocking context;
//! the monitor runs each tick on Tokio's blocking pool.  The state is an
//! atomic, and the open handle sits behind a mutex held for exactly one I/O
//! call.  `Connected → Disconnected` is a compare-and-swap, so when a write
//! failure and the monitor notice the same outage only one of them reports
//! it.
//!
//! [`send`]: ConnectionManager::send
//! [`readline`]: ConnectionManager::readline

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use c64kb_core::protocol::{encode_frame, handshake_bytes, BAUD_RATE, HANDSHAKE_REPLY};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::relay_keys::FrameSink;

use super::{LinkError, PortInfo, SerialBackend, SerialLine};

/// Capacity of the event channel handed to the caller.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Link state as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            2 => Self::Connected,
            1 => Self::Connecting,
            _ => Self::Disconnected,
        }
    }
}

/// Notification sent to the owner of the event receiver.
///
/// Serializes as `{"type": "connected", "path": "/dev/ttyACM0"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionEvent {
    Connected { path: String },
    Disconnected { path: String },
}

impl ConnectionEvent {
    /// Device path the event refers to.
    pub fn path(&self) -> &str {
        match self {
            Self::Connected { path } | Self::Disconnected { path } => path,
        }
    }
}

/// Timing and line settings for the link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub baud_rate: u32,
    /// Upper bound for a single read.
    pub read_timeout: Duration,
    /// Pause between sending the greeting and reading the reply.
    pub settle_time: Duration,
    /// Cadence of the background monitor.
    pub monitor_interval: Duration,
    /// Lines read while waiting for the handshake reply.
    pub max_handshake_lines: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: BAUD_RATE,
            read_timeout: Duration::from_millis(100),
            settle_time: Duration::from_millis(1000),
            monitor_interval: Duration::from_millis(1000),
            max_handshake_lines: 16,
        }
    }
}

struct Inner {
    config: LinkConfig,
    backend: Arc<dyn SerialBackend>,
    state: AtomicU8,
    target: Mutex<Option<String>>,
    /// Path of the open line; `Some` only while connected.
    bound: Mutex<Option<String>>,
    line: Mutex<Option<Box<dyn SerialLine>>>,
    event_tx: mpsc::Sender<ConnectionEvent>,
}

/// Handle to the serial link.  Clones share the same link.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("target", &*lock(&self.inner.target))
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectionManager {
    /// Creates a disconnected manager and returns it together with the
    /// event receiver.
    pub fn new(
        config: LinkConfig,
        backend: Arc<dyn SerialBackend>,
    ) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Inner {
            config,
            backend,
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            target: Mutex::new(None),
            bound: Mutex::new(None),
            line: Mutex::new(None),
            event_tx: tx,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Path the manager is trying to stay connected to.
    pub fn target(&self) -> Option<String> {
        lock(&self.inner.target).clone()
    }

    /// Enumerates serial ports for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Enumerate`] if the OS query fails.
    pub fn list_ports(&self) -> Result<Vec<PortInfo>, LinkError> {
        self.inner.backend.available_ports()
    }

    /// Rebinds the device path.
    ///
    /// An open link is dropped first, which emits `disconnected`.  The
    /// monitor connects to the new path on a later tick.
    pub fn set_target(&self, path: Option<String>) {
        info!("serial target set to {}", path.as_deref().unwrap_or("<none>"));
        // Stored before disconnecting so a handshake finishing concurrently
        // either sees the new target or has already committed its link.
        *lock(&self.inner.target) = path;
        self.force_disconnect("target changed");
    }

    /// Frames `payload` and writes it to the device.
    ///
    /// Returns the number of bytes put on the wire, or 0 when disconnected,
    /// when `payload` is empty or too long, or when the write fails.  A
    /// failed write drops the link.
    pub fn send(&self, payload: &[u8]) -> usize {
        if payload.is_empty() || !self.is_connected() {
            return 0;
        }
        let frame = match encode_frame(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("frame not sent: {e}");
                return 0;
            }
        };

        let result = {
            let mut guard = lock(&self.inner.line);
            match guard.as_mut() {
                Some(line) => line.write_all(&frame).and_then(|()| line.flush()),
                None => return 0,
            }
        };

        match result {
            Ok(()) => frame.len(),
            Err(e) => {
                warn!("serial write failed: {e}");
                self.force_disconnect("write failed");
                0
            }
        }
    }

    /// Reads one line from the device, waiting at most the read timeout.
    ///
    /// Returns `None` when disconnected, when no complete line arrived, or
    /// on an I/O error (which drops the link).
    pub fn readline(&self) -> Option<String> {
        if !self.is_connected() {
            return None;
        }
        let result = {
            let mut guard = lock(&self.inner.line);
            guard.as_mut()?.read_line()
        };
        match result {
            Ok(line) => line,
            Err(e) => {
                warn!("serial read failed: {e}");
                self.force_disconnect("read failed");
                None
            }
        }
    }

    /// One monitor iteration.
    ///
    /// Connected: drop the link if the device has vanished from the port
    /// list.  Disconnected with a target: attempt the handshake.  Blocks for
    /// up to the settle time plus the handshake reads.
    pub fn tick(&self) {
        match self.state() {
            ConnectionState::Connected => self.check_presence(),
            ConnectionState::Disconnected => {
                let Some(path) = self.target() else {
                    return;
                };
                self.try_connect(&path);
            }
            ConnectionState::Connecting => {}
        }
    }

    /// Spawns the background monitor, which calls [`tick`](Self::tick)
    /// every `monitor_interval` until `cancel` fires.
    pub fn spawn_monitor(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.inner.config.monitor_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let m = manager.clone();
                        if let Err(e) = tokio::task::spawn_blocking(move || m.tick()).await {
                            error!("connection monitor tick failed: {e}");
                        }
                    }
                }
            }
            debug!("connection monitor stopped");
        })
    }

    /// Closes the link without emitting an event.  Used on shutdown.
    pub fn close(&self) {
        self.inner
            .state
            .store(ConnectionState::Disconnected as u8, Ordering::Release);
        lock(&self.inner.line).take();
        if let Some(path) = lock(&self.inner.bound).take() {
            info!("closed serial link to {path}");
        }
    }

    // ── Internals ──────────────────────────────────────────────────────────────

    fn check_presence(&self) {
        let Some(path) = lock(&self.inner.bound).clone() else {
            return;
        };
        match self.inner.backend.available_ports() {
            Ok(ports) if ports.iter().any(|p| p.path == path) => {}
            Ok(_) => self.force_disconnect("device no longer present"),
            Err(e) => warn!("port enumeration failed; keeping link to {path}: {e}"),
        }
    }

    fn try_connect(&self, path: &str) {
        if self
            .inner
            .state
            .compare_exchange(
                ConnectionState::Disconnected as u8,
                ConnectionState::Connecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let line = match self.handshake(path) {
            Ok(line) => line,
            Err(e) => {
                debug!("handshake with {path} failed: {e}");
                self.set_state(ConnectionState::Disconnected);
                return;
            }
        };

        // The target lock is held until `connected` is emitted, so a
        // concurrent `set_target` either wins the check below or disconnects
        // this link after the event.
        let target = lock(&self.inner.target);
        if target.as_deref() != Some(path) {
            debug!("target changed during handshake; dropping link to {path}");
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        *lock(&self.inner.line) = Some(line);
        *lock(&self.inner.bound) = Some(path.to_string());
        self.set_state(ConnectionState::Connected);
        info!("connected to {path}");
        self.emit(ConnectionEvent::Connected {
            path: path.to_string(),
        });
        drop(target);
    }

    fn handshake(&self, path: &str) -> Result<Box<dyn SerialLine>, LinkError> {
        let present = self
            .inner
            .backend
            .available_ports()?
            .iter()
            .any(|p| p.path == path);
        if !present {
            return Err(LinkError::NotPresent {
                path: path.to_string(),
            });
        }

        let cfg = &self.inner.config;
        let mut line = self
            .inner
            .backend
            .open(path, cfg.baud_rate, cfg.read_timeout)?;

        let io_err = |source| LinkError::Io {
            path: path.to_string(),
            source,
        };
        line.write_all(&handshake_bytes()).map_err(io_err)?;
        line.flush().map_err(io_err)?;

        if !cfg.settle_time.is_zero() {
            std::thread::sleep(cfg.settle_time);
        }

        for _ in 0..cfg.max_handshake_lines {
            match line.read_line().map_err(io_err)? {
                Some(reply) if reply.trim() == HANDSHAKE_REPLY => return Ok(line),
                Some(other) => debug!("ignoring pre-handshake line from {path}: {other:?}"),
                None => break,
            }
        }
        Err(LinkError::NoReply {
            path: path.to_string(),
        })
    }

    /// Drops the link if it is up; only the caller that wins the state
    /// transition emits `disconnected`.
    fn force_disconnect(&self, reason: &str) {
        if self
            .inner
            .state
            .compare_exchange(
                ConnectionState::Connected as u8,
                ConnectionState::Disconnected as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        lock(&self.inner.line).take();
        let path = lock(&self.inner.bound).take().unwrap_or_default();
        warn!("disconnected from {path}: {reason}");
        self.emit(ConnectionEvent::Disconnected { path });
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    fn emit(&self, event: ConnectionEvent) {
        match self.inner.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("event channel full; dropping {event:?}");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event receiver dropped");
            }
        }
    }
}

impl FrameSink for ConnectionManager {
    fn send_frame(&self, payload: &[u8]) -> usize {
        self.send(payload)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

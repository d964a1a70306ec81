//! C64 Keyboard relay entry point.
//!
//! Headless runner: loads the configuration, keeps the serial link to the
//! keyboard controller alive, logs what the device prints, and types every
//! line read from stdin on the C64.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()              -- TOML app config (defaults on first run)
//!  └─ LayoutStore                -- JSON key configuration → KeyTranslator
//!  └─ start services
//!       ├─ connection monitor    (Tokio task, blocking ticks)
//!       ├─ event pump            (logs connect/disconnect, resets matrix)
//!       ├─ device line reader    (Tokio task)
//!       └─ stdin typist          (Tokio task)
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use c64kb_core::KeyTranslator;
use c64kb_host::application::relay_keys::KeyRelay;
use c64kb_host::infrastructure::serial::connection_manager::{ConnectionEvent, ConnectionManager};
use c64kb_host::infrastructure::serial::SystemSerialBackend;
use c64kb_host::infrastructure::storage::config::{config_file_path, load_config, AppConfig};
use c64kb_host::infrastructure::storage::layouts::LayoutStore;

/// How often buffered device output is drained.
const READ_INTERVAL: Duration = Duration::from_millis(200);

/// Lines drained per read interval at most.
const MAX_LINES_PER_READ: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_err) = match load_config() {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.app.log_level)),
        )
        .init();

    info!("C64 Keyboard relay starting");
    if let Some(e) = config_err {
        warn!("using default configuration: {e}");
    }

    // ── Key configuration ─────────────────────────────────────────────────────
    let store = LayoutStore::new(&config.keyboard.config_dir);
    let key_config = store
        .load_key_config(&config.keyboard.lang)
        .with_context(|| format!("loading key configuration from {}", store.dir().display()))?;
    match store.find_layout(&config.keyboard.model, &config.keyboard.lang) {
        Ok(Some(layout)) => info!("layout {} {} ({})", layout.model, layout.name, layout.lang),
        Ok(None) => warn!(
            "no layout descriptor for model {} language {:?}",
            config.keyboard.model, config.keyboard.lang
        ),
        Err(e) => warn!("cannot list layouts: {e}"),
    }
    let translator = Arc::new(KeyTranslator::new(key_config));

    // ── Serial link ───────────────────────────────────────────────────────────
    let (manager, mut events) = ConnectionManager::new(
        config.device.link_config(),
        Arc::new(SystemSerialBackend),
    );
    match manager.list_ports() {
        Ok(ports) => {
            for port in ports {
                info!("Device: {} ; Description: {}", port.path, port.description);
            }
        }
        Err(e) => warn!("{e}"),
    }
    if config.device.path.is_none() {
        let hint = config_file_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "config.toml".to_string());
        warn!("no device path configured; set [device] path in {hint}");
    }
    manager.set_target(config.device.path.clone());

    let cancel = CancellationToken::new();
    let monitor = manager.spawn_monitor(cancel.clone());

    let relay = Arc::new(KeyRelay::new(
        manager.clone(),
        translator,
        config.keyboard.text_char_delay(),
    ));

    // ── Event pump ────────────────────────────────────────────────────────────
    let relay_events = Arc::clone(&relay);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Connected { path } => {
                    info!("keyboard controller ready on {path}");
                    let relay = Arc::clone(&relay_events);
                    let reset = tokio::task::spawn_blocking(move || relay.reset_matrix());
                    if let Err(e) = reset.await {
                        warn!("matrix reset after connect failed: {e}");
                    }
                }
                ConnectionEvent::Disconnected { path } => {
                    warn!("connection to {path} lost; waiting for device");
                }
            }
        }
    });

    // ── Device line reader ────────────────────────────────────────────────────
    let reader_manager = manager.clone();
    let reader_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(READ_INTERVAL);
        loop {
            tokio::select! {
                _ = reader_cancel.cancelled() => break,
                _ = interval.tick() => {
                    let m = reader_manager.clone();
                    let lines = tokio::task::spawn_blocking(move || {
                        let mut lines = Vec::new();
                        while lines.len() < MAX_LINES_PER_READ {
                            match m.readline() {
                                Some(line) => lines.push(line),
                                None => break,
                            }
                        }
                        lines
                    })
                    .await
                    .unwrap_or_default();
                    for line in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
                        info!(" --> {line}");
                    }
                }
            }
        }
    });

    // ── Stdin typist ──────────────────────────────────────────────────────────
    let relay_stdin = Arc::clone(&relay);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let relay = Arc::clone(&relay_stdin);
                    let text = format!("{line}\n");
                    let outcome =
                        tokio::task::spawn_blocking(move || relay.type_text(&text)).await;
                    if let Ok(outcome) = outcome {
                        if outcome.sent < outcome.frames {
                            warn!(
                                "typed {} of {} frames; is the device connected?",
                                outcome.sent, outcome.frames
                            );
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("stdin read failed: {e}");
                    break;
                }
            }
        }
    });

    // ── Ctrl-C / SIGTERM handler ──────────────────────────────────────────────
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            ctrl_c_cancel.cancel();
        }
    });

    info!("C64 Keyboard relay ready.  Type lines to send them; Ctrl-C to exit.");
    cancel.cancelled().await;

    monitor.await.context("joining connection monitor")?;
    manager.close();
    info!("C64 Keyboard relay stopped");
    Ok(())
}

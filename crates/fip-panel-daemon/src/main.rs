//! FIP Panel Daemon
//!
//! Background service driving a flight instrument panel: page lifecycle,
//! gauge rendering, button bindings and a D-Bus control interface.

mod bindings;
mod config;
mod controller;
mod dbus;
mod diagnostics;
mod error;
mod gauges;
mod output;
mod pages;
mod profile;
mod rendering;
mod settings;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use fip_panel_hw::{EventSink, SimulatedDevice};

use config::Config;
use controller::PanelController;
use output::{CommandSink, LogKeyEmitter, UdpCommandSink};
use profile::{FileProfileStore, ProfileStore};

/// Discards protocol commands when no command socket could be opened.
struct NullCommandSink;

impl CommandSink for NullCommandSink {
    fn send(&self, command: &bindings::ProtocolCommand) -> error::Result<()> {
        debug!("Dropping protocol command '{}'", command);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = Config::load(&config_path).context("Failed to load configuration")?;
    info!("Loaded configuration from: {}", config_path);

    if let Err(e) = std::fs::create_dir_all(&config.state_dir) {
        warn!(
            "Failed to create state directory {:?}: {}",
            config.state_dir, e
        );
    }

    // No native driver is linked; the simulated panel stands in for it
    let (events, event_rx) = EventSink::channel(config.event_queue.max(1));
    let device = Arc::new(SimulatedDevice::with_events(events));

    let commands: Arc<dyn CommandSink> = match UdpCommandSink::new(&config.protocol.address) {
        Ok(sink) => {
            info!("Protocol commands go to {}", sink.target());
            Arc::new(sink)
        }
        Err(e) => {
            warn!(
                "Protocol output unavailable ({}): {}. Commands will be dropped.",
                config.protocol.address, e
            );
            Arc::new(NullCommandSink)
        }
    };
    let profiles: Arc<dyn ProfileStore> = Arc::new(FileProfileStore::new(&config.state_dir));

    let bus_type = config.dbus.bus;
    let controller = Arc::new(PanelController::new(
        config,
        device,
        Arc::new(LogKeyEmitter),
        commands,
        Some(profiles),
    ));
    controller
        .start(event_rx)
        .context("Failed to start panel controller")?;

    // Log controller notifications
    let mut signals = controller.subscribe();
    tokio::spawn(async move {
        while let Ok(signal) = signals.recv().await {
            debug!("Panel signal: {:?}", signal);
        }
    });

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Keep a clone of shutdown_tx to prevent the channel from closing if D-Bus fails
    let _shutdown_tx_keepalive = shutdown_tx.clone();

    // Start D-Bus service
    let _dbus_connection =
        match dbus::run_dbus_server(controller.clone(), shutdown_tx, bus_type).await {
            Ok(conn) => {
                info!("D-Bus service started");
                Some(conn)
            }
            Err(e) => {
                warn!(
                    "Failed to start D-Bus service: {}. Continuing without D-Bus.",
                    e
                );
                None
            }
        };

    // Setup Unix signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = shutdown_rx.recv() => {
            info!("Shutdown requested via D-Bus");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    if controller.is_dirty() {
        match controller.save_profile() {
            Ok(count) => info!("Saved {} binding record(s) before exit", count),
            Err(e) => warn!("Failed to save bindings before exit: {}", e),
        }
    }
    controller.shutdown().await;

    Ok(())
}

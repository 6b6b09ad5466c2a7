//! D-Bus interface implementation using zbus.
//!
//! Provides the `org.fippanel.Panel1` interface.

use std::sync::Arc;

use fip_panel_hw::{ButtonIdentity, Edge};
use tracing::{debug, info, warn};
use zbus::{interface, Connection};

use crate::bindings::{KeySequence, ProtocolCommand};
use crate::config::DbusBusType;
use crate::controller::PanelController;
use crate::error::Error;
use crate::pages::{AddOutcome, RemoveOutcome};

/// Object path of the panel interface.
pub const OBJECT_PATH: &str = "/org/fippanel/Panel";

/// Well-known bus name requested by the daemon.
pub const BUS_NAME: &str = "org.fippanel.Panel";

fn to_fdo(e: Error) -> zbus::fdo::Error {
    match e {
        Error::InvalidArgument(_) | Error::Parse { .. } => {
            zbus::fdo::Error::InvalidArgs(e.to_string())
        }
        _ => zbus::fdo::Error::Failed(e.to_string()),
    }
}

fn parse_button(button: &str) -> zbus::fdo::Result<ButtonIdentity> {
    button
        .parse()
        .map_err(|e: fip_panel_hw::Error| zbus::fdo::Error::InvalidArgs(e.to_string()))
}

fn parse_edge(edge: &str) -> zbus::fdo::Result<Edge> {
    edge.parse()
        .map_err(|e: fip_panel_hw::Error| zbus::fdo::Error::InvalidArgs(e.to_string()))
}

/// D-Bus interface implementation for one panel.
pub struct Panel1Interface {
    controller: Arc<PanelController>,
    shutdown_tx: tokio::sync::mpsc::Sender<()>,
}

impl Panel1Interface {
    /// Creates a new D-Bus interface.
    pub fn new(controller: Arc<PanelController>, shutdown_tx: tokio::sync::mpsc::Sender<()>) -> Self {
        Self {
            controller,
            shutdown_tx,
        }
    }
}

#[interface(name = "org.fippanel.Panel1")]
impl Panel1Interface {
    /// Lists tracked pages in registration order.
    fn list_pages(&self) -> Vec<u32> {
        self.controller.pages()
    }

    /// Adds a page. Returns false when the page was already tracked.
    fn add_page(&self, page: u32, active: bool) -> zbus::fdo::Result<bool> {
        let outcome = self.controller.add_page(page, active).map_err(to_fdo)?;
        debug!("D-Bus: AddPage({}, {}) -> {:?}", page, active, outcome);
        Ok(outcome == AddOutcome::Added)
    }

    /// Removes a page. Returns false when the page was not tracked.
    fn remove_page(&self, page: u32) -> zbus::fdo::Result<bool> {
        let outcome = self.controller.remove_page(page).map_err(to_fdo)?;
        debug!("D-Bus: RemovePage({}) -> {:?}", page, outcome);
        Ok(outcome == RemoveOutcome::Removed)
    }

    /// Sets a keystroke binding, e.g. `("SOFTBUTTON_1_P2", "on", "A:Press@0ms,A:Release@50ms", "")`.
    ///
    /// An empty sequence clears the binding.
    fn set_key_binding(
        &self,
        button: &str,
        edge: &str,
        sequence: &str,
        information: &str,
    ) -> zbus::fdo::Result<()> {
        let button = parse_button(button)?;
        let edge = parse_edge(edge)?;
        let sequence: KeySequence = sequence.parse().map_err(to_fdo)?;
        self.controller
            .set_key_binding(button, edge, sequence, information)
            .map_err(to_fdo)?;
        debug!("D-Bus: SetKeyBinding({}, {})", button, edge);
        Ok(())
    }

    /// Sets a protocol binding; each command is `CONTROL ARGUMENT`.
    fn set_protocol_binding(
        &self,
        button: &str,
        edge: &str,
        commands: Vec<String>,
        description: &str,
    ) -> zbus::fdo::Result<()> {
        let button = parse_button(button)?;
        let edge = parse_edge(edge)?;
        let commands = commands
            .iter()
            .map(|c| c.parse::<ProtocolCommand>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(to_fdo)?;
        self.controller
            .set_protocol_binding(button, edge, commands, description)
            .map_err(to_fdo)?;
        debug!("D-Bus: SetProtocolBinding({}, {})", button, edge);
        Ok(())
    }

    /// Clears the bindings of one button, or all bindings when `button` is empty.
    fn clear_bindings(&self, button: &str) -> zbus::fdo::Result<()> {
        if button.is_empty() {
            self.controller.clear_all_bindings().map_err(to_fdo)?;
        } else {
            let button = parse_button(button)?;
            self.controller.clear_bindings(button).map_err(to_fdo)?;
        }
        debug!("D-Bus: ClearBindings({})", button);
        Ok(())
    }

    /// Returns the settings records of every configured binding.
    fn export_settings(&self) -> Vec<String> {
        self.controller.export_settings()
    }

    /// Replaces all bindings.
    ///
    /// Returns the imported key and protocol binding counts and one
    /// `line: reason` entry per rejected record.
    fn import_settings(&self, records: Vec<String>) -> zbus::fdo::Result<(u32, u32, Vec<String>)> {
        let report = self.controller.import_settings(&records).map_err(to_fdo)?;
        let issues = report
            .issues
            .iter()
            .map(|issue| format!("{}: {}", issue.line, issue.reason))
            .collect();
        info!(
            "D-Bus: ImportSettings ({} key, {} protocol, {} rejected)",
            report.key_bindings,
            report.protocol_bindings,
            report.issues.len()
        );
        Ok((
            report.key_bindings as u32,
            report.protocol_bindings as u32,
            issues,
        ))
    }

    /// Saves the bindings to the profile store, returning the record count.
    fn save_profile(&self) -> zbus::fdo::Result<u32> {
        let saved = self.controller.save_profile().map_err(to_fdo)?;
        Ok(saved as u32)
    }

    /// Stores a telemetry value.
    fn push_telemetry(&self, address: u32, value: u32) {
        self.controller.on_telemetry(address, value);
    }

    /// Shuts down the daemon.
    async fn quit(&self) -> zbus::fdo::Result<()> {
        info!("D-Bus: Quit requested");
        self.shutdown_tx
            .send(())
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(())
    }

    // Properties

    /// Controller lifecycle state.
    #[zbus(property)]
    fn state(&self) -> String {
        self.controller.state().to_string()
    }

    /// Active page, or -1 when none.
    #[zbus(property)]
    fn active_page(&self) -> i64 {
        self.controller.active_page().map(i64::from).unwrap_or(-1)
    }

    /// Whether bindings changed since the last save.
    #[zbus(property)]
    fn dirty(&self) -> bool {
        self.controller.is_dirty()
    }

    /// Panel instance name.
    #[zbus(property)]
    fn instance(&self) -> String {
        self.controller.instance().to_string()
    }
}

/// Connects to the appropriate D-Bus bus based on configuration.
async fn connect_to_bus(bus_type: DbusBusType) -> anyhow::Result<(Connection, &'static str)> {
    match bus_type {
        DbusBusType::Session => {
            let conn = Connection::session()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to session bus: {}", e))?;
            Ok((conn, "session"))
        }
        DbusBusType::System => {
            let conn = Connection::system()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to system bus: {}", e))?;
            Ok((conn, "system"))
        }
        DbusBusType::Auto => match Connection::session().await {
            Ok(conn) => Ok((conn, "session")),
            Err(session_err) => {
                warn!(
                    "Session bus unavailable ({}), trying system bus",
                    session_err
                );
                let conn = Connection::system().await.map_err(|system_err| {
                    anyhow::anyhow!(
                        "Failed to connect to any D-Bus: session={}, system={}",
                        session_err,
                        system_err
                    )
                })?;
                Ok((conn, "system"))
            }
        },
    }
}

/// Runs the D-Bus server.
pub async fn run_dbus_server(
    controller: Arc<PanelController>,
    shutdown_tx: tokio::sync::mpsc::Sender<()>,
    bus_type: DbusBusType,
) -> anyhow::Result<Connection> {
    let interface = Panel1Interface::new(controller, shutdown_tx);

    let (connection, bus_name) = connect_to_bus(bus_type).await?;

    connection
        .object_server()
        .at(OBJECT_PATH, interface)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to register object: {}", e))?;

    connection
        .request_name(BUS_NAME)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to request bus name: {}", e))?;

    info!("D-Bus service registered at {} on {} bus", BUS_NAME, bus_name);
    Ok(connection)
}

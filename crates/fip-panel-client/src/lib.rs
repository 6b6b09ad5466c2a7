//! D-Bus client library for communicating with the FIP panel daemon.
//!
//! Used by `fippanelctl` and by anything else that wants to script a panel.

use anyhow::{Context, Result};
use tracing::debug;
use zbus::{proxy, Connection};

/// Well-known bus name of the daemon.
pub const BUS_NAME: &str = "org.fippanel.Panel";

/// D-Bus bus type selection.
#[derive(Debug, Clone, Copy, Default)]
pub enum BusType {
    /// Session bus (user session).
    Session,
    /// System bus (system-wide).
    System,
    /// Try session first, fall back to system.
    #[default]
    Auto,
}

/// D-Bus proxy for the panel daemon.
#[proxy(
    interface = "org.fippanel.Panel1",
    default_service = "org.fippanel.Panel",
    default_path = "/org/fippanel/Panel"
)]
trait Panel1 {
    /// Lists tracked pages in registration order.
    fn list_pages(&self) -> zbus::Result<Vec<u32>>;

    /// Adds a page; false when it was already tracked.
    fn add_page(&self, page: u32, active: bool) -> zbus::Result<bool>;

    /// Removes a page; false when it was not tracked.
    fn remove_page(&self, page: u32) -> zbus::Result<bool>;

    /// Sets a keystroke binding.
    fn set_key_binding(
        &self,
        button: &str,
        edge: &str,
        sequence: &str,
        information: &str,
    ) -> zbus::Result<()>;

    /// Sets a protocol binding.
    fn set_protocol_binding(
        &self,
        button: &str,
        edge: &str,
        commands: Vec<String>,
        description: &str,
    ) -> zbus::Result<()>;

    /// Clears one button's bindings, or all when `button` is empty.
    fn clear_bindings(&self, button: &str) -> zbus::Result<()>;

    /// Returns the settings records.
    fn export_settings(&self) -> zbus::Result<Vec<String>>;

    /// Replaces all bindings; returns (key count, protocol count, issues).
    fn import_settings(&self, records: Vec<String>) -> zbus::Result<(u32, u32, Vec<String>)>;

    /// Saves bindings to the profile store.
    fn save_profile(&self) -> zbus::Result<u32>;

    /// Stores a telemetry value.
    fn push_telemetry(&self, address: u32, value: u32) -> zbus::Result<()>;

    /// Shuts down the daemon.
    fn quit(&self) -> zbus::Result<()>;

    /// Controller lifecycle state.
    #[zbus(property)]
    fn state(&self) -> zbus::Result<String>;

    /// Active page, -1 when none.
    #[zbus(property)]
    fn active_page(&self) -> zbus::Result<i64>;

    /// Whether bindings changed since the last save.
    #[zbus(property)]
    fn dirty(&self) -> zbus::Result<bool>;

    /// Panel instance name.
    #[zbus(property)]
    fn instance(&self) -> zbus::Result<String>;
}

/// Outcome of an import as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub key_bindings: u32,
    pub protocol_bindings: u32,
    /// `line: reason` per rejected record.
    pub issues: Vec<String>,
}

/// Snapshot of the daemon's properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelStatus {
    pub instance: String,
    pub state: String,
    pub active_page: Option<u32>,
    pub dirty: bool,
}

async fn open_bus(bus_type: BusType) -> Result<Connection> {
    debug!("Connecting to {:?} bus", bus_type);
    match bus_type {
        BusType::System => Connection::system()
            .await
            .context("Failed to connect to system bus"),
        _ => Connection::session()
            .await
            .context("Failed to connect to session bus"),
    }
}

/// D-Bus client wrapper for the daemon.
pub struct PanelClient {
    proxy: Panel1Proxy<'static>,
}

impl PanelClient {
    /// Attempts to connect to the daemon via D-Bus with auto bus detection.
    ///
    /// Tries session bus first, falls back to system bus.
    pub async fn connect() -> Result<Self> {
        Self::connect_with_bus(BusType::Auto).await
    }

    /// Attempts to connect to the daemon via D-Bus with specified bus type.
    ///
    /// With [`BusType::Auto`] the daemon must actually own its name on the
    /// chosen bus; an explicit bus is used as is.
    pub async fn connect_with_bus(bus_type: BusType) -> Result<Self> {
        let connection = match bus_type {
            BusType::Session => open_bus(BusType::Session).await?,
            BusType::System => open_bus(BusType::System).await?,
            BusType::Auto => {
                let mut found = None;
                for candidate in [BusType::Session, BusType::System] {
                    match open_bus(candidate).await {
                        Ok(conn) if Self::service_exists(&conn).await => {
                            debug!("Found daemon on {:?} bus", candidate);
                            found = Some(conn);
                            break;
                        }
                        Ok(_) => debug!("Daemon not on {:?} bus", candidate),
                        Err(e) => debug!("{:#}", e),
                    }
                }
                found.context(
                    "Daemon service not found on session or system bus. Is fippaneld running?",
                )?
            }
        };

        let proxy = Panel1Proxy::new(&connection)
            .await
            .context("Failed to create D-Bus proxy")?;

        Ok(Self { proxy })
    }

    /// Checks if the daemon owns its well-known name on the given connection.
    async fn service_exists(conn: &Connection) -> bool {
        let Ok(name) = zbus::names::BusName::try_from(BUS_NAME) else {
            return false;
        };
        match zbus::fdo::DBusProxy::new(conn).await {
            Ok(dbus) => dbus.name_has_owner(name).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Lists tracked pages.
    pub async fn list_pages(&self) -> Result<Vec<u32>> {
        self.proxy
            .list_pages()
            .await
            .context("Failed to list pages via D-Bus")
    }

    /// Adds a page; returns false when it was already tracked.
    pub async fn add_page(&self, page: u32, active: bool) -> Result<bool> {
        self.proxy
            .add_page(page, active)
            .await
            .context("Failed to add page via D-Bus")
    }

    /// Removes a page; returns false when it was not tracked.
    pub async fn remove_page(&self, page: u32) -> Result<bool> {
        self.proxy
            .remove_page(page)
            .await
            .context("Failed to remove page via D-Bus")
    }

    /// Sets a keystroke binding.
    pub async fn set_key_binding(
        &self,
        button: &str,
        edge: &str,
        sequence: &str,
        information: &str,
    ) -> Result<()> {
        self.proxy
            .set_key_binding(button, edge, sequence, information)
            .await
            .context("Failed to set key binding via D-Bus")
    }

    /// Sets a protocol binding.
    pub async fn set_protocol_binding(
        &self,
        button: &str,
        edge: &str,
        commands: Vec<String>,
        description: &str,
    ) -> Result<()> {
        self.proxy
            .set_protocol_binding(button, edge, commands, description)
            .await
            .context("Failed to set protocol binding via D-Bus")
    }

    /// Clears one button's bindings, or every binding when `button` is `None`.
    pub async fn clear_bindings(&self, button: Option<&str>) -> Result<()> {
        self.proxy
            .clear_bindings(button.unwrap_or(""))
            .await
            .context("Failed to clear bindings via D-Bus")
    }

    /// Returns the settings records.
    pub async fn export_settings(&self) -> Result<Vec<String>> {
        self.proxy
            .export_settings()
            .await
            .context("Failed to export settings via D-Bus")
    }

    /// Replaces all bindings with `records`.
    pub async fn import_settings(&self, records: Vec<String>) -> Result<ImportSummary> {
        let (key_bindings, protocol_bindings, issues) = self
            .proxy
            .import_settings(records)
            .await
            .context("Failed to import settings via D-Bus")?;
        Ok(ImportSummary {
            key_bindings,
            protocol_bindings,
            issues,
        })
    }

    /// Saves bindings to the profile store; returns the record count.
    pub async fn save_profile(&self) -> Result<u32> {
        self.proxy
            .save_profile()
            .await
            .context("Failed to save profile via D-Bus")
    }

    /// Stores a telemetry value.
    pub async fn push_telemetry(&self, address: u32, value: u32) -> Result<()> {
        self.proxy
            .push_telemetry(address, value)
            .await
            .context("Failed to push telemetry via D-Bus")
    }

    /// Reads the daemon's properties.
    pub async fn status(&self) -> Result<PanelStatus> {
        let instance = self.proxy.instance().await.context("Failed to read instance")?;
        let state = self.proxy.state().await.context("Failed to read state")?;
        let active_page = self
            .proxy
            .active_page()
            .await
            .context("Failed to read active page")?;
        let dirty = self.proxy.dirty().await.context("Failed to read dirty flag")?;
        Ok(PanelStatus {
            instance,
            state,
            active_page: u32::try_from(active_page).ok(),
            dirty,
        })
    }

    /// Shuts down the daemon.
    pub async fn quit(&self) -> Result<()> {
        self.proxy
            .quit()
            .await
            .context("Failed to send quit via D-Bus")
    }
}

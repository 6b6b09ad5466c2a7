//! Configuration management.

use anyhow::{Context, Result};
use fip_panel_hw::ProfilePage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lower bound for the render refresh interval in milliseconds.
pub const MIN_REFRESH_MS: u64 = 50;
/// Upper bound for the render refresh interval in milliseconds.
pub const MAX_REFRESH_MS: u64 = 10_000;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Panel instance name, used in page labels and profile file names
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Directory holding saved binding profiles
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Display refresh rate in milliseconds
    #[serde(default = "default_refresh")]
    pub refresh: u64,

    /// Capacity of the device event queue
    #[serde(default = "default_event_queue")]
    pub event_queue: usize,

    /// Pages registered at startup
    #[serde(default = "default_pages")]
    pub pages: Vec<PageConfig>,

    /// Canvas configuration
    #[serde(default)]
    pub canvas: CanvasConfig,

    /// Protocol command output
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// D-Bus configuration
    #[serde(default)]
    pub dbus: DbusConfig,
}

/// A page registered with the device at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageConfig {
    /// Device page identifier
    pub id: u32,

    /// Gauge rendered on this page
    #[serde(default = "default_gauge")]
    pub gauge: String,

    /// Whether the page is activated when added
    #[serde(default)]
    pub active: bool,

    /// Profile page (1-3) qualifying button events while this page is shown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_page: Option<u8>,
}

impl PageConfig {
    /// Profile page qualifier, ignoring out-of-range numbers.
    pub fn profile(&self) -> Option<ProfilePage> {
        self.profile_page.and_then(ProfilePage::from_number)
    }
}

/// Canvas configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// Canvas width
    #[serde(default = "default_width")]
    pub width: u32,

    /// Canvas height
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

/// Where protocol commands are sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// UDP address of the simulation's command listener
    #[serde(default = "default_protocol_address")]
    pub address: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            address: default_protocol_address(),
        }
    }
}

/// Which message bus the daemon registers on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbusBusType {
    /// Session bus, falling back to the system bus
    #[default]
    Auto,
    Session,
    System,
}

/// D-Bus configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbusConfig {
    /// "auto", "session" or "system"
    #[serde(default)]
    pub bus: DbusBusType,
}

// Default value functions
fn default_instance() -> String {
    "fip0".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

fn default_refresh() -> u64 {
    250
}

fn default_event_queue() -> usize {
    64
}

fn default_pages() -> Vec<PageConfig> {
    vec![PageConfig {
        id: 0,
        gauge: default_gauge(),
        active: true,
        profile_page: None,
    }]
}

fn default_gauge() -> String {
    "splash".to_string()
}

fn default_width() -> u32 {
    fip_panel_hw::FIP_WIDTH
}

fn default_height() -> u32 {
    fip_panel_hw::FIP_HEIGHT
}

fn default_protocol_address() -> String {
    "127.0.0.1:7778".to_string()
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        Self::parse(&content)
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Refresh interval, clamped to the supported range.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh.clamp(MIN_REFRESH_MS, MAX_REFRESH_MS))
    }

    /// Configuration for a page id, if one exists.
    pub fn page(&self, id: u32) -> Option<&PageConfig> {
        self.pages.iter().find(|p| p.id == id)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            state_dir: default_state_dir(),
            refresh: default_refresh(),
            event_queue: default_event_queue(),
            pages: default_pages(),
            canvas: CanvasConfig::default(),
            protocol: ProtocolConfig::default(),
            dbus: DbusConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.instance, "fip0");
        assert_eq!(config.refresh, 250);
        assert_eq!(config.pages, default_pages());
        assert_eq!(config.canvas.width, 320);
        assert_eq!(config.canvas.height, 240);
        assert_eq!(config.protocol.address, "127.0.0.1:7778");
        assert_eq!(config.dbus.bus, DbusBusType::Auto);
    }

    #[test]
    fn test_pages_parse() {
        let config = Config::parse(
            r#"
            instance = "left"

            [dbus]
            bus = "system"

            [[pages]]
            id = 1
            gauge = "dial"
            active = true

            [[pages]]
            id = 2
            profile_page = 2

            [[pages]]
            id = 3
            profile_page = 9
            "#,
        )
        .unwrap();

        assert_eq!(config.instance, "left");
        assert_eq!(config.dbus.bus, DbusBusType::System);
        assert_eq!(config.pages.len(), 3);
        assert_eq!(config.page(1).unwrap().gauge, "dial");
        assert_eq!(config.page(2).unwrap().gauge, "splash");
        assert_eq!(config.page(2).unwrap().profile(), Some(ProfilePage::P2));
        assert_eq!(config.page(3).unwrap().profile(), None);
        assert!(config.page(4).is_none());
    }

    #[test]
    fn test_refresh_is_clamped() {
        let mut config = Config::default();
        config.refresh = 1;
        assert_eq!(config.refresh_interval(), Duration::from_millis(50));
        config.refresh = 60_000;
        assert_eq!(config.refresh_interval(), Duration::from_millis(10_000));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "instance = \"right\"\nrefresh = 500\n").unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.instance, "right");
        assert_eq!(loaded.refresh_interval(), Duration::from_millis(500));
        assert_eq!(loaded.pages, default_pages());
        assert!(Config::load(dir.path().join("missing.toml")).is_err());
    }
}

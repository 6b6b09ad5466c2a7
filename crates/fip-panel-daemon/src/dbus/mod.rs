//! D-Bus interface for the panel daemon.
//!
//! Provides the `org.fippanel.Panel1` interface on the session or system bus.

mod interface;

pub use interface::run_dbus_server;

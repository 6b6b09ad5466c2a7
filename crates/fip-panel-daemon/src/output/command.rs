//! Protocol command delivery.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use tracing::{debug, warn};

use crate::bindings::ProtocolCommand;
use crate::error::{Error, Result};

/// Delivers protocol commands to the simulation.
pub trait CommandSink: Send + Sync {
    fn send(&self, command: &ProtocolCommand) -> Result<()>;
}

/// Sends each command as a `CONTROL ARGUMENT\n` datagram.
#[derive(Debug)]
pub struct UdpCommandSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpCommandSink {
    /// Binds an ephemeral local socket aimed at `address` (e.g. `127.0.0.1:7778`).
    pub fn new(address: &str) -> Result<Self> {
        let target = address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::InvalidArgument(format!("unresolvable address '{}'", address)))?;
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        debug!("Protocol commands go to {}", target);
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl CommandSink for UdpCommandSink {
    fn send(&self, command: &ProtocolCommand) -> Result<()> {
        let wire = command.to_wire();
        let sent = self.socket.send_to(wire.as_bytes(), self.target)?;
        if sent != wire.len() {
            warn!("Short datagram for '{}': {}/{} bytes", command, sent, wire.len());
        }
        Ok(())
    }
}

/// Collects sent commands in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingCommandSink {
    sent: std::sync::Mutex<Vec<ProtocolCommand>>,
}

#[cfg(test)]
impl RecordingCommandSink {
    pub fn sent(&self) -> Vec<ProtocolCommand> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl CommandSink for RecordingCommandSink {
    fn send(&self, command: &ProtocolCommand) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(command.clone());
        }
        Ok(())
    }
}

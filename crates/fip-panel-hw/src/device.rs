//! Device adapter seam.
//!
//! The native driver is an opaque collaborator: it adds and removes pages,
//! blits raw images and invokes callbacks on its own thread when a page is
//! activated or the button mask changes. Callbacks are turned into
//! [`DeviceEvent`]s posted onto a bounded channel so that driver threads never
//! run application logic.

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::Result;

/// Status codes reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Unspecified failure.
    Fail,
    /// The driver rejected an argument.
    InvalidArg,
    /// The device handle is no longer valid.
    Handle,
    /// The page is not registered with the device.
    PageNotActive,
    /// Image buffer smaller than the device expects.
    BufferTooSmall,
    /// The driver ran out of memory.
    OutOfMemory,
    /// Operation not supported by this device type.
    NotImplemented,
    /// Raw driver code without a known meaning.
    Other(i32),
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Fail => write!(f, "E_FAIL"),
            DeviceStatus::InvalidArg => write!(f, "E_INVALIDARG"),
            DeviceStatus::Handle => write!(f, "E_HANDLE"),
            DeviceStatus::PageNotActive => write!(f, "E_PAGENOTACTIVE"),
            DeviceStatus::BufferTooSmall => write!(f, "E_BUFFERTOOSMALL"),
            DeviceStatus::OutOfMemory => write!(f, "E_OUTOFMEMORY"),
            DeviceStatus::NotImplemented => write!(f, "E_NOTIMPL"),
            DeviceStatus::Other(code) => write!(f, "0x{:08X}", code),
        }
    }
}

/// Operations the controller needs from a physical panel.
///
/// Implementations must be callable from any thread; the controller
/// serializes image writes itself.
pub trait DeviceAdapter: Send + Sync {
    /// Registers a page, optionally making it the displayed one.
    fn add_page(&self, page: u32, label: &str, active: bool) -> Result<()>;

    /// Unregisters a page.
    fn remove_page(&self, page: u32) -> Result<()>;

    /// Blits a packed 24-bit image to a page.
    fn set_image(&self, page: u32, data: &[u8], stride: usize) -> Result<()>;

    /// Human-readable device description for logs.
    fn describe(&self) -> String {
        "panel".to_string()
    }
}

/// Events raised by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A page was activated or deactivated on the device.
    PageActivation { page: u32, activated: bool },
    /// The pressed-button mask changed.
    Buttons { mask: u32 },
}

/// Callback end of the event channel, handed to the driver glue.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<DeviceEvent>,
}

impl EventSink {
    /// Creates a sink and its receiving end with the given queue capacity.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DeviceEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Posts an event without blocking the caller.
    ///
    /// Returns false when the queue is full or the receiver is gone.
    pub fn post(&self, event: DeviceEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                debug!("Posted device event {:?}", event);
                true
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Device event queue full, dropping {:?}", event);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Driver page callback.
    pub fn on_page_activation(&self, page: u32, activated: bool) -> bool {
        self.post(DeviceEvent::PageActivation { page, activated })
    }

    /// Driver soft button callback.
    pub fn on_button_event(&self, mask: u32) -> bool {
        self.post(DeviceEvent::Buttons { mask })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_preserves_order() {
        let (sink, mut rx) = EventSink::channel(4);
        assert!(sink.on_page_activation(2, true));
        assert!(sink.on_button_event(0x20));
        assert_eq!(
            rx.try_recv().unwrap(),
            DeviceEvent::PageActivation {
                page: 2,
                activated: true
            }
        );
        assert_eq!(rx.try_recv().unwrap(), DeviceEvent::Buttons { mask: 0x20 });
    }

    #[test]
    fn test_full_queue_drops() {
        let (sink, _rx) = EventSink::channel(1);
        assert!(sink.on_button_event(1));
        assert!(!sink.on_button_event(2));
    }

    #[test]
    fn test_closed_queue() {
        let (sink, rx) = EventSink::channel(1);
        drop(rx);
        assert!(!sink.on_button_event(1));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(DeviceStatus::Fail.to_string(), "E_FAIL");
        assert_eq!(DeviceStatus::Other(0x10).to_string(), "0x00000010");
    }
}

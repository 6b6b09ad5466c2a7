//! In-memory panel used when no native driver is attached.
//!
//! Records every call, keeps the last image per page, can be told to fail
//! specific operations and can raise events as if the driver had called back.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::device::{DeviceAdapter, DeviceStatus, EventSink};
use crate::{Error, Result};

/// A call received by the simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    AddPage { page: u32, label: String, active: bool },
    RemovePage { page: u32 },
    SetImage { page: u32, len: usize, stride: usize },
}

#[derive(Default)]
struct SimState {
    calls: Vec<DeviceCall>,
    pages: Vec<u32>,
    images: HashMap<u32, Vec<u8>>,
    fail_add: Option<DeviceStatus>,
    fail_remove: Option<DeviceStatus>,
    fail_image: Option<DeviceStatus>,
}

/// Headless [`DeviceAdapter`].
#[derive(Default)]
pub struct SimulatedDevice {
    state: Mutex<SimState>,
    events: Option<EventSink>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device that reports page activations and button presses to `events`.
    pub fn with_events(events: EventSink) -> Self {
        Self {
            state: Mutex::default(),
            events: Some(events),
        }
    }

    /// Makes every following `add_page` fail with `status` (None to heal).
    pub fn fail_add_page(&self, status: Option<DeviceStatus>) {
        self.lock().fail_add = status;
    }

    /// Makes every following `remove_page` fail with `status` (None to heal).
    pub fn fail_remove_page(&self, status: Option<DeviceStatus>) {
        self.lock().fail_remove = status;
    }

    /// Makes every following `set_image` fail with `status` (None to heal).
    pub fn fail_set_image(&self, status: Option<DeviceStatus>) {
        self.lock().fail_image = status;
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.lock().calls.clone()
    }

    /// Pages currently registered on the device.
    pub fn pages(&self) -> Vec<u32> {
        self.lock().pages.clone()
    }

    /// Last image written to `page`.
    pub fn image(&self, page: u32) -> Option<Vec<u8>> {
        self.lock().images.get(&page).cloned()
    }

    /// Simulates the user changing the pressed-button mask.
    pub fn press(&self, mask: u32) -> bool {
        self.events
            .as_ref()
            .map(|sink| sink.on_button_event(mask))
            .unwrap_or(false)
    }

    /// Simulates the user scrolling to a page.
    pub fn activate(&self, page: u32, activated: bool) -> bool {
        self.events
            .as_ref()
            .map(|sink| sink.on_page_activation(page, activated))
            .unwrap_or(false)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DeviceAdapter for SimulatedDevice {
    fn add_page(&self, page: u32, label: &str, active: bool) -> Result<()> {
        {
            let mut state = self.lock();
            state.calls.push(DeviceCall::AddPage {
                page,
                label: label.to_string(),
                active,
            });
            if let Some(status) = state.fail_add {
                return Err(Error::Device {
                    op: "add_page",
                    status,
                });
            }
            if !state.pages.contains(&page) {
                state.pages.push(page);
            }
        }
        debug!("Simulated device: page {} added ({})", page, label);
        if active {
            self.activate(page, true);
        }
        Ok(())
    }

    fn remove_page(&self, page: u32) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(DeviceCall::RemovePage { page });
        if let Some(status) = state.fail_remove {
            return Err(Error::Device {
                op: "remove_page",
                status,
            });
        }
        state.pages.retain(|p| *p != page);
        state.images.remove(&page);
        debug!("Simulated device: page {} removed", page);
        Ok(())
    }

    fn set_image(&self, page: u32, data: &[u8], stride: usize) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(DeviceCall::SetImage {
            page,
            len: data.len(),
            stride,
        });
        if let Some(status) = state.fail_image {
            return Err(Error::Device {
                op: "set_image",
                status,
            });
        }
        if stride == 0 || data.is_empty() || data.len() % stride != 0 {
            return Err(Error::FrameSize {
                expected: data.len().div_ceil(stride.max(1)) * stride.max(1),
                actual: data.len(),
            });
        }
        state.images.insert(page, data.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "simulated panel".to_string()
    }
}

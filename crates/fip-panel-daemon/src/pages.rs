//! Registry of pages registered with the device.

use fip_panel_hw::DeviceAdapter;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Result of [`PageRegistry::add`] when no device error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The device accepted the page.
    Added,
    /// The page was already tracked; the device was not called.
    AlreadyTracked,
}

/// Result of [`PageRegistry::remove`] when no device error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// The page was not tracked; the device was not called.
    NotTracked,
}

/// Pages the device currently knows about, in registration order.
#[derive(Debug, Default)]
pub struct PageRegistry {
    instance: String,
    pages: Vec<u32>,
    closed: bool,
}

impl PageRegistry {
    /// Creates an empty registry; `instance` names the panel in page labels.
    pub fn new(instance: &str) -> Self {
        Self {
            instance: instance.to_string(),
            pages: Vec::new(),
            closed: false,
        }
    }

    /// Label sent to the device for a page.
    pub fn label(&self, page: u32) -> String {
        format!("{} PageNo: {}", self.instance, page)
    }

    /// Registers a page with the device unless it is already tracked.
    pub fn add(&mut self, device: &dyn DeviceAdapter, page: u32, active: bool) -> Result<AddOutcome> {
        if self.pages.contains(&page) {
            return Ok(AddOutcome::AlreadyTracked);
        }

        let label = self.label(page);
        device.add_page(page, &label, active).map_err(|e| {
            warn!("Failed to add page {}: {}", page, e);
            e
        })?;

        self.pages.push(page);
        self.closed = false;
        debug!("Page {} added (active: {})", page, active);
        Ok(AddOutcome::Added)
    }

    /// Removes a tracked page from the device.
    ///
    /// The page stays tracked when the device refuses the removal.
    pub fn remove(&mut self, device: &dyn DeviceAdapter, page: u32) -> Result<RemoveOutcome> {
        let Some(pos) = self.pages.iter().position(|p| *p == page) else {
            return Ok(RemoveOutcome::NotTracked);
        };

        device.remove_page(page).map_err(|e| {
            warn!("Failed to remove page {}: {}", page, e);
            e
        })?;

        self.pages.remove(pos);
        debug!("Page {} removed", page);
        Ok(RemoveOutcome::Removed)
    }

    /// Removes every page, head first, then marks the registry closed.
    ///
    /// A page the device refuses to remove is dropped anyway so shutdown
    /// always terminates.
    pub fn shutdown(&mut self, device: &dyn DeviceAdapter) {
        while let Some(&page) = self.pages.first() {
            debug!("Shutdown: removing page {}", page);
            if let Err(e) = device.remove_page(page) {
                warn!("Shutdown: device failed to remove page {}: {}", page, e);
            }
            self.pages.remove(0);
        }
        self.closed = true;
        info!("All pages removed from {}", self.instance);
    }

    /// Tracked pages in registration order.
    pub fn pages(&self) -> &[u32] {
        &self.pages
    }

    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Page after `current` in registration order, wrapping around.
    pub fn next_page(&self, current: u32) -> Option<u32> {
        let pos = self.pages.iter().position(|p| *p == current);
        match pos {
            Some(i) => self.pages.get((i + 1) % self.pages.len()).copied(),
            None => self.pages.first().copied(),
        }
    }

    /// Page before `current` in registration order, wrapping around.
    pub fn previous_page(&self, current: u32) -> Option<u32> {
        let pos = self.pages.iter().position(|p| *p == current);
        match pos {
            Some(i) => {
                let len = self.pages.len();
                self.pages.get((i + len - 1) % len).copied()
            }
            None => self.pages.last().copied(),
        }
    }
}

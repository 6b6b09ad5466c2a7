//! Live telemetry values received from the simulation.

use std::collections::BTreeMap;

/// Latest value per telemetry address.
#[derive(Debug, Clone, Default)]
pub struct TelemetryState {
    values: BTreeMap<u32, u32>,
    updates: u64,
}

impl TelemetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, returning the previous one for the address.
    pub fn update(&mut self, address: u32, value: u32) -> Option<u32> {
        self.updates = self.updates.wrapping_add(1);
        self.values.insert(address, value)
    }

    pub fn get(&self, address: u32) -> Option<u32> {
        self.values.get(&address).copied()
    }

    /// Number of updates received since start.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Owned copy handed to renderers so no lock is held while drawing.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            values: self.values.clone(),
            updates: self.updates,
        }
    }
}

/// Point-in-time copy of [`TelemetryState`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    values: BTreeMap<u32, u32>,
    updates: u64,
}

impl TelemetrySnapshot {
    pub fn get(&self, address: u32) -> Option<u32> {
        self.values.get(&address).copied()
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Values in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.values.iter().map(|(a, v)| (*a, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_keeps_latest() {
        let mut state = TelemetryState::new();
        assert_eq!(state.update(0x1000, 5), None);
        assert_eq!(state.update(0x1000, 7), Some(5));
        state.update(0x0800, 1);

        assert_eq!(state.get(0x1000), Some(7));
        assert_eq!(state.len(), 2);
        assert_eq!(state.updates(), 3);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut state = TelemetryState::new();
        state.update(2, 20);
        state.update(1, 10);
        let snapshot = state.snapshot();
        state.update(1, 11);

        assert_eq!(snapshot.get(1), Some(10));
        assert_eq!(snapshot.iter().collect::<Vec<_>>(), vec![(1, 10), (2, 20)]);
        assert_eq!(snapshot.updates(), 2);
    }
}

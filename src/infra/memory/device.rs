//! Recording device-state bus.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::{DeviceState, DeviceStateBus};

#[derive(Default)]
struct Lamps {
    published: HashMap<String, Vec<DeviceState>>,
    physical: HashMap<String, DeviceState>,
}

/// Device-state bus that remembers every publication.
///
/// Physical devices report [`DeviceState::InUse`] unless told otherwise.
#[derive(Default)]
pub struct MemoryDeviceBus {
    lamps: Mutex<Lamps>,
    changed: Condvar,
}

impl MemoryDeviceBus {
    /// Empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest state published for `device`.
    #[must_use]
    pub fn last(&self, device: &str) -> Option<DeviceState> {
        self.lamps
            .lock()
            .published
            .get(device)
            .and_then(|h| h.last().copied())
    }

    /// Every state published for `device`, oldest first.
    #[must_use]
    pub fn history(&self, device: &str) -> Vec<DeviceState> {
        self.lamps
            .lock()
            .published
            .get(device)
            .cloned()
            .unwrap_or_default()
    }

    /// Set what a physical device reports.
    pub fn set_device_state(&self, device: &str, state: DeviceState) {
        self.lamps.lock().physical.insert(device.to_owned(), state);
    }

    /// Block until `device` was last published as `state`.
    pub fn wait_for(&self, device: &str, state: DeviceState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut lamps = self.lamps.lock();
        loop {
            if lamps.published.get(device).and_then(|h| h.last()) == Some(&state) {
                return true;
            }
            if self.changed.wait_until(&mut lamps, deadline).timed_out() {
                return lamps.published.get(device).and_then(|h| h.last()) == Some(&state);
            }
        }
    }
}

impl DeviceStateBus for MemoryDeviceBus {
    fn publish(&self, device: &str, state: DeviceState) {
        let mut lamps = self.lamps.lock();
        lamps
            .published
            .entry(device.to_owned())
            .or_default()
            .push(state);
        self.changed.notify_all();
    }

    fn device_state(&self, device: &str) -> DeviceState {
        self.lamps
            .lock()
            .physical
            .get(device)
            .copied()
            .unwrap_or(DeviceState::InUse)
    }
}

//! Last observed motion value per device.
//!
//! Entries are created on first sighting and never evicted; the store grows
//! with the number of distinct topics seen during the process lifetime.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Thread-safe map from device id to its last motion value.
///
/// A single mutex guards the whole map. No I/O happens while it is held.
#[derive(Debug, Default)]
pub struct DeviceStateStore {
    devices: Mutex<HashMap<String, i64>>,
}

impl DeviceStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last motion value for `device_id`, or `None` if never seen.
    pub fn get(&self, device_id: &str) -> Option<i64> {
        self.devices.lock().get(device_id).copied()
    }

    /// Unconditionally overwrite the value for `device_id`.
    pub fn set(&self, device_id: &str, motion: i64) {
        self.devices.lock().insert(device_id.to_string(), motion);
    }

    /// Store `motion` and return the previous value in one critical section.
    pub fn replace(&self, device_id: &str, motion: i64) -> Option<i64> {
        let mut devices = self.devices.lock();
        match devices.get_mut(device_id) {
            Some(value) => Some(std::mem::replace(value, motion)),
            None => {
                devices.insert(device_id.to_string(), motion);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }
}

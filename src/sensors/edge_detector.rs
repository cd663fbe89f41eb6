//! Motion transition detection.
//!
//! A reading fires a notification when its device has never been seen, or
//! when its motion value differs from the last stored one. The first
//! sighting always fires so the recipient learns the initial state.

use super::{DeviceStateStore, SensorReading};
use crate::notify::NotificationRequest;
use std::sync::Arc;

pub const MOTION_DETECTED: &str = "Motion detected";
pub const MOTION_CLEARED: &str = "Motion cleared";

pub struct EdgeDetector {
    store: Arc<DeviceStateStore>,
    recipient: String,
}

impl EdgeDetector {
    /// Create a detector over `store`, addressing notifications to `recipient`.
    pub fn new(store: Arc<DeviceStateStore>, recipient: impl Into<String>) -> Self {
        Self {
            store,
            recipient: recipient.into(),
        }
    }

    /// Record `reading` and return a notification if it is a transition.
    ///
    /// The store is updated whether or not a notification fires, so a
    /// repeated identical reading never fires twice.
    pub fn process(&self, reading: &SensorReading) -> Option<NotificationRequest> {
        let previous = self.store.replace(&reading.device_id, reading.motion);
        if previous == Some(reading.motion) {
            return None;
        }

        let body = if reading.motion_detected() {
            MOTION_DETECTED
        } else {
            MOTION_CLEARED
        };

        Some(NotificationRequest {
            recipient: self.recipient.clone(),
            subject: reading.device_id.clone(),
            body: body.to_string(),
        })
    }
}

//! Motion sensor readings and per-device transition tracking.
//!
//! Raw MQTT payloads are decoded into [`SensorReading`]s, which the
//! [`EdgeDetector`] checks against the [`DeviceStateStore`] to decide whether
//! a notification is due.

pub mod device_store;
pub mod edge_detector;
pub mod reading;

pub use device_store::DeviceStateStore;
pub use edge_detector::{EdgeDetector, MOTION_CLEARED, MOTION_DETECTED};
pub use reading::{SensorReading, decode, payload_preview};

//! MQTT input source for motion sensor telemetry.
//!
//! Wraps the broker connection and hands every publish on the configured
//! topic filter to the ingestion pipeline as an [`MqttMessage`].

mod client;

pub use client::{MqttClient, MqttMessage};

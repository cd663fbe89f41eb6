//! Input sources feeding the ingestion pipeline.
//!
//! Current input sources:
//! - `mqtt`: BTHome motion sensors published through an MQTT broker

pub mod mqtt;

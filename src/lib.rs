//! Rook: MQTT motion sensor watcher.
//!
//! Subscribes to BTHome motion sensor telemetry, sends an e-mail whenever a
//! sensor's motion state changes, and exposes a live message counter over
//! HTTP and WebSocket.

pub mod config;
pub mod context;
pub mod error;
pub mod input;
pub mod notify;
pub mod pipeline;
pub mod sensors;
pub mod status;

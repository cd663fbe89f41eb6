//! Live status interface.
//!
//! Exposes the processed-message counter over HTTP (`GET /status`, `GET /`)
//! and as a WebSocket stream (`GET /ws`) that pushes a snapshot to each
//! observer on its own timer.

mod broadcaster;
mod server;

pub use broadcaster::stream_status;
pub use server::{INDEX_PATH, STATUS_PATH, STREAM_PATH, StatusServer};

use crate::context::EventCounter;
use serde::{Deserialize, Serialize};

/// Payload returned by the point query and pushed on the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: String,
    pub message_count: u64,
}

impl StatusSnapshot {
    pub fn capture(counter: &EventCounter) -> Self {
        Self {
            status: "ok".to_string(),
            message_count: counter.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json() {
        let counter = EventCounter::new();
        counter.increment();

        let json = serde_json::to_string(&StatusSnapshot::capture(&counter)).unwrap();
        assert_eq!(json, r#"{"status":"ok","message_count":1}"#);
    }
}

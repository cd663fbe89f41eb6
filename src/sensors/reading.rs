//! BTHome motion sensor payload decoding.
//!
//! Payloads arrive as JSON published by the BLE gateway, e.g.
//! `{"encryption":false,"BTHome_version":2,"pid":198,"Battery":100,"Illuminance":0,"Motion":1,"addr":"e8:e0:7e:a6:ac:db","rssi":-56}`.

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;

/// Maximum number of payload bytes included in log lines.
const PREVIEW_LEN: usize = 256;

/// Payload keys as the gateway spells them.
const WIRE_KEYS: [&str; 8] = [
    "Motion",
    "encryption",
    "BTHome_version",
    "pid",
    "Battery",
    "Illuminance",
    "addr",
    "rssi",
];

/// One decoded telemetry sample.
///
/// Missing payload fields take their zero value; unknown fields are ignored.
/// Keys match case-insensitively; if a key repeats in a different case, the
/// last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorReading {
    /// Topic the reading arrived on.
    #[serde(skip_deserializing)]
    pub device_id: String,

    /// Motion flag: 0 = clear, nonzero = detected
    #[serde(rename = "Motion")]
    pub motion: i64,

    pub encryption: bool,

    #[serde(rename = "BTHome_version")]
    pub protocol_version: i64,

    #[serde(rename = "pid")]
    pub process_id: i64,

    /// Battery level (%)
    #[serde(rename = "Battery")]
    pub battery: i64,

    /// Illuminance (lux)
    #[serde(rename = "Illuminance")]
    pub illuminance: i64,

    /// BLE MAC address of the sensor
    pub addr: String,

    /// Signal strength (dBm)
    pub rssi: i64,
}

impl SensorReading {
    pub fn motion_detected(&self) -> bool {
        self.motion != 0
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} motion={} battery={}% illuminance={} rssi={} addr={} encryption={} bthome_version={} pid={}",
            self.device_id,
            self.motion,
            self.battery,
            self.illuminance,
            self.rssi,
            self.addr,
            self.encryption,
            self.protocol_version,
            self.process_id
        )
    }
}

fn canonical_key(key: String) -> String {
    WIRE_KEYS
        .iter()
        .find(|wire| wire.eq_ignore_ascii_case(&key))
        .map_or(key, |wire| wire.to_string())
}

/// Decode a raw MQTT payload received on `topic`.
pub fn decode(topic: &str, body: &[u8]) -> Result<SensorReading, DecodeError> {
    let to_error = |source: serde_json::Error| DecodeError {
        topic: topic.to_string(),
        source,
    };

    // Object order is preserved, so folding keys keeps the last occurrence.
    let fields: Map<String, Value> = serde_json::from_slice(body).map_err(to_error)?;
    let fields: Map<String, Value> = fields
        .into_iter()
        .map(|(key, value)| (canonical_key(key), value))
        .collect();

    let mut reading: SensorReading =
        serde_json::from_value(Value::Object(fields)).map_err(to_error)?;
    reading.device_id = topic.to_string();
    Ok(reading)
}

/// Lossy, truncated view of a payload for log output.
pub fn payload_preview(body: &[u8]) -> Cow<'_, str> {
    let end = body.len().min(PREVIEW_LEN);
    let preview = String::from_utf8_lossy(&body[..end]);
    if end < body.len() {
        Cow::Owned(format!("{}...", preview))
    } else {
        preview
    }
}

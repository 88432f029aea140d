// ── Appliance broker message codec ──
//
// Devices speak JSON envelopes `{"msg": <type>, "time": ..., ...}` on two
// topics per device. Inbound messages are decoded into `Inbound`; the
// three outbound requests are built here so the session never formats
// JSON by hand.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::model::SensorSample;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Topic pair for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Published to.
    pub command: String,
    /// Subscribed to.
    pub status: String,
}

impl Topics {
    pub fn new(model_number: &str, device_id: &str) -> Self {
        Self {
            command: format!("{model_number}/{device_id}/command"),
            status: format!("{model_number}/{device_id}/status/current"),
        }
    }
}

/// A decoded message from a device.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Full state snapshot.
    CurrentState(HashMap<String, String>),
    /// Per-key transitions, already reduced to the new value.
    StateChange(HashMap<String, String>),
    SensorData(SensorSample),
    /// Any message type the bridge does not act on.
    Other(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    msg: String,
    #[serde(default)]
    time: Option<String>,
    #[serde(rename = "product-state", default)]
    product_state: Option<Map<String, Value>>,
    #[serde(default)]
    data: Option<Map<String, Value>>,
}

/// Decode a status-topic payload.
pub fn decode(payload: &[u8]) -> Result<Inbound, serde_json::Error> {
    let envelope: Envelope = serde_json::from_slice(payload)?;
    let inbound = match envelope.msg.as_str() {
        "CURRENT-STATE" => Inbound::CurrentState(flatten(envelope.product_state)),
        "STATE-CHANGE" => Inbound::StateChange(flatten(envelope.product_state)),
        "ENVIRONMENTAL-CURRENT-SENSOR-DATA" => Inbound::SensorData(SensorSample {
            time: envelope.time,
            data: flatten(envelope.data),
        }),
        _ => Inbound::Other(envelope.msg),
    };
    Ok(inbound)
}

/// Reduce every value to a string; `[old, new]` pairs keep the new value.
fn flatten(map: Option<Map<String, Value>>) -> HashMap<String, String> {
    map.unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| scalar(value).map(|v| (key, v)))
        .collect()
}

fn scalar(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Array(items) => items.into_iter().last().and_then(scalar),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.format(TIME_FORMAT).to_string()
}

pub fn request_current_state(now: DateTime<Utc>) -> Vec<u8> {
    json!({
        "msg": "REQUEST-CURRENT-STATE",
        "time": timestamp(now),
    })
    .to_string()
    .into_bytes()
}

pub fn request_sensor_data(now: DateTime<Utc>) -> Vec<u8> {
    json!({
        "msg": "REQUEST-PRODUCT-ENVIRONMENT-CURRENT-SENSOR-DATA",
        "time": timestamp(now),
    })
    .to_string()
    .into_bytes()
}

pub fn state_set(now: DateTime<Utc>, data: &HashMap<String, String>) -> Vec<u8> {
    json!({
        "msg": "STATE-SET",
        "time": timestamp(now),
        "mode-reason": "LAPP",
        "data": data,
    })
    .to_string()
    .into_bytes()
}

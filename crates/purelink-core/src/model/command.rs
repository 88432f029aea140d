// ── Platform command envelopes ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the platform waits for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStrategy {
    /// Fire-and-forget; no response is sent.
    #[default]
    Optimistic,
    /// The platform expects a response envelope.
    Pessimistic,
}

/// A command addressed to one device service. Consumed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub device_id: String,
    pub service_id: String,
    /// JSON-encoded keyword arguments for the service, if any.
    #[serde(default)]
    pub payload: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    #[serde(default)]
    pub completion_strategy: CompletionStrategy,
}

/// Response to a pessimistic command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub device_id: String,
    pub service_id: String,
    pub correlation_id: String,
    pub payload: serde_json::Value,
}

impl CommandResponse {
    pub fn to_command(command: &Command, payload: serde_json::Value) -> Self {
        Self {
            device_id: command.device_id.clone(),
            service_id: command.service_id.clone(),
            correlation_id: command.correlation_id.clone(),
            payload,
        }
    }
}

/// Unsolicited data pushed from a device to the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub device_id: String,
    pub service_id: String,
    pub payload: serde_json::Value,
}

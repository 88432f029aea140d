// ── Device service handlers ──
//
// Each platform service maps onto a partial state set or a read of the
// session's cached data. Handlers return the response body; the router
// turns any error into `{"status": 1}`.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{ServiceError, SessionError};
use crate::manager::DeviceHandle;
use crate::model::ServiceId;
use crate::session::Session;

const SPEED_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PowerArgs {
    power: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct OscillationArgs {
    oscillation: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SpeedArgs {
    speed: u8,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MonitoringArgs {
    monitoring: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

/// Run `service_id` against `device` with the JSON-encoded `payload`.
pub async fn invoke(
    device: &DeviceHandle,
    service_id: &str,
    payload: Option<&str>,
) -> Result<Value, ServiceError> {
    let service = ServiceId::from_str(service_id)
        .map_err(|_| ServiceError::UnknownService(service_id.to_owned()))?;
    if !device.record.model.supports(service) {
        return Err(ServiceError::UnknownService(service_id.to_owned()));
    }
    debug!(device_id = %device.record.id, %service, "invoking service");

    match service {
        ServiceId::SetPower => {
            let args: PowerArgs = decode(payload)?;
            let fmod = if args.power { "FAN" } else { "OFF" };
            apply(device, "fmod", fmod).await
        }
        ServiceId::SetOscillation => {
            let args: OscillationArgs = decode(payload)?;
            apply(device, "oson", on_off(args.oscillation)).await
        }
        ServiceId::SetSpeed => {
            let args: SpeedArgs = decode(payload)?;
            if !SPEED_RANGE.contains(&args.speed) {
                return Err(ServiceError::InvalidArgument(format!(
                    "speed {} outside {}..={}",
                    args.speed,
                    SPEED_RANGE.start(),
                    SPEED_RANGE.end()
                )));
            }
            apply(device, "fnsp", &format!("{:04}", args.speed)).await
        }
        ServiceId::SetMonitoring => {
            let args: MonitoringArgs = decode(payload)?;
            apply(device, "rhtm", on_off(args.monitoring)).await
        }
        ServiceId::GetDeviceState => {
            let _: NoArgs = decode_optional(payload)?;
            device_state(device)
        }
        ServiceId::GetSensorReadings => {
            let _: NoArgs = decode_optional(payload)?;
            sensor_readings(device)
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "ON" } else { "OFF" }
}

fn decode<T: DeserializeOwned>(payload: Option<&str>) -> Result<T, ServiceError> {
    let raw = payload.ok_or_else(|| ServiceError::InvalidArgument("missing payload".into()))?;
    Ok(serde_json::from_str(raw)?)
}

fn decode_optional<T: DeserializeOwned>(payload: Option<&str>) -> Result<T, ServiceError> {
    match payload {
        Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(raw)?),
        _ => Ok(serde_json::from_str("{}")?),
    }
}

fn session(device: &DeviceHandle) -> Result<&Session, ServiceError> {
    device.session.as_deref().ok_or_else(|| {
        ServiceError::Session(SessionError::NotConnected {
            device_id: device.record.id.clone(),
        })
    })
}

async fn apply(device: &DeviceHandle, key: &str, value: &str) -> Result<Value, ServiceError> {
    let partial = HashMap::from([(key.to_owned(), value.to_owned())]);
    session(device)?.set_state(partial).await?;
    Ok(json!({ "status": 0 }))
}

fn device_state(device: &DeviceHandle) -> Result<Value, ServiceError> {
    let session = session(device)?;
    let state = session.device_state().ok_or_else(|| ServiceError::Unavailable {
        device_id: device.record.id.clone(),
        what: "state",
    })?;
    let get = |key: &str| state.get(key).map(String::as_str);

    Ok(json!({
        "status": 0,
        "power": get("fmod").is_some_and(|m| m != "OFF"),
        "oscillation": get("oson") == Some("ON"),
        "speed": get("fnsp").and_then(|s| s.parse::<u8>().ok()),
        "monitoring": session.monitoring(),
    }))
}

fn sensor_readings(device: &DeviceHandle) -> Result<Value, ServiceError> {
    let sample = session(device)?
        .last_sample()
        .ok_or_else(|| ServiceError::Unavailable {
            device_id: device.record.id.clone(),
            what: "sensor readings",
        })?;

    let mut body = serde_json::to_value(sample.readings())?;
    if let Value::Object(map) = &mut body {
        map.insert("status".into(), json!(0));
    }
    Ok(body)
}

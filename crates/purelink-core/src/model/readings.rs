// ── Environmental sensor samples ──

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Sleep-timer echo the firmware mixes into sensor data.
const SLEEP_TIMER_KEY: &str = "sltm";

/// Values meaning "sensor not ready". A sample carrying any of them is dropped.
const SENTINELS: &[(&str, &str)] = &[
    ("hact", "OFF"),
    ("tact", "OFF"),
    ("vact", "INIT"),
    ("pact", "INIT"),
];

/// Raw `ENVIRONMENTAL-CURRENT-SENSOR-DATA` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSample {
    /// Message time as sent by the device.
    pub time: Option<String>,
    pub data: HashMap<String, String>,
}

impl SensorSample {
    pub fn has_sentinel(&self) -> bool {
        SENTINELS
            .iter()
            .any(|(key, sentinel)| self.data.get(*key).is_some_and(|v| v == sentinel))
    }

    /// Drop fields that are not sensor readings.
    pub fn strip_echoes(&mut self) {
        self.data.remove(SLEEP_TIMER_KEY);
    }

    /// Convert raw device units into platform units.
    ///
    /// Fields that are absent or do not parse are left as `None`.
    pub fn readings(&self) -> SensorReadings {
        let int = |key: &str| self.data.get(key).and_then(|v| v.parse::<u32>().ok());
        SensorReadings {
            humidity: int("hact"),
            temperature: self
                .data
                .get("tact")
                .and_then(|v| v.parse::<f64>().ok())
                .map(deci_kelvin_to_celsius),
            voc: int("vact"),
            dust: int("pact"),
            time: self.time.clone(),
        }
    }
}

/// Deci-Kelvin to degrees Celsius, rounded to two places.
fn deci_kelvin_to_celsius(raw: f64) -> f64 {
    ((raw / 10.0 - 273.15) * 100.0).round() / 100.0
}

/// Sensor sample in platform units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    /// Relative humidity in percent.
    pub humidity: Option<u32>,
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    /// Volatile organic compound index.
    pub voc: Option<u32>,
    /// Particulate index.
    pub dust: Option<u32>,
    pub time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pairs: &[(&str, &str)]) -> SensorSample {
        SensorSample {
            time: Some("2024-03-01T10:00:00.000Z".into()),
            data: pairs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        }
    }

    #[test]
    fn sentinel_values_are_detected() {
        assert!(sample(&[("hact", "OFF"), ("tact", "2950")]).has_sentinel());
        assert!(sample(&[("vact", "INIT")]).has_sentinel());
        assert!(!sample(&[("hact", "0045"), ("tact", "2950"), ("vact", "0003"), ("pact", "0002")]).has_sentinel());
    }

    #[test]
    fn sleep_timer_is_stripped() {
        let mut s = sample(&[("hact", "0045"), ("sltm", "OFF")]);
        s.strip_echoes();
        assert!(!s.data.contains_key("sltm"));
        assert!(s.data.contains_key("hact"));
    }

    #[test]
    fn readings_are_converted() {
        let r = sample(&[("hact", "0045"), ("tact", "2956"), ("vact", "0003"), ("pact", "0010")]).readings();
        assert_eq!(r.humidity, Some(45));
        assert_eq!(r.temperature, Some(22.45));
        assert_eq!(r.voc, Some(3));
        assert_eq!(r.dust, Some(10));
        assert_eq!(r.time.as_deref(), Some("2024-03-01T10:00:00.000Z"));
    }
}

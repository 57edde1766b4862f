//! Core data shapes shared across the service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier of one configured senseBox.
pub type BoxId = String;

/// One temperature reading obtained from a senseBox.
///
/// Immutable once constructed; `observed_at` is the measurement time
/// reported by the remote sensor, not the time we fetched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub box_id: BoxId,
    pub temperature_celsius: f64,
    pub observed_at: DateTime<Utc>,
}

/// Cache slot for one senseBox: the reading plus the local fetch time.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub reading: Reading,
    pub fetched_at: DateTime<Utc>,
}

// openSenseMap payload shapes. Only the fields we consume are declared;
// everything else in the (large) box document is ignored.

#[derive(Debug, Deserialize)]
pub struct BoxPayload {
    #[serde(default)]
    pub sensors: Vec<SensorPayload>,
}

#[derive(Debug, Deserialize)]
pub struct SensorPayload {
    pub title: Option<String>,
    #[serde(rename = "lastMeasurement")]
    pub last_measurement: Option<MeasurementPayload>,
}

#[derive(Debug, Deserialize)]
pub struct MeasurementPayload {
    // The API reports numeric values as JSON strings; accept either form.
    pub value: Option<serde_json::Value>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<String>,
}

//! HTTP client for the openSenseMap API.
//!
//! One fetch per box per call; failures come back as tagged errors and
//! never cross this boundary as panics. Retry, if any, belongs to the
//! scheduler's next cycle, not to this client.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use std::time::Duration as StdDuration;
use thiserror::Error;

use crate::config::Settings;
use crate::model::{BoxPayload, Reading};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("senseBox {box_id} is unreachable: {detail}")]
    Unreachable { box_id: String, detail: String },

    #[error("senseBox {box_id} returned a malformed payload: {detail}")]
    MalformedResponse { box_id: String, detail: String },

    #[error("senseBox {box_id} reading is stale ({age_seconds}s old)")]
    Stale { box_id: String, age_seconds: i64 },
}

pub struct SenseBoxClient {
    http: Client,
    api_base: String,
    phenomenon: String,
    freshness: Duration,
}

impl SenseBoxClient {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let http = Client::builder()
            .connect_timeout(StdDuration::from_secs(settings.connect_timeout_seconds))
            .timeout(StdDuration::from_secs(settings.read_timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            phenomenon: settings.phenomenon.clone(),
            freshness: Duration::seconds(settings.freshness_window_seconds as i64),
        })
    }

    fn box_url(&self, box_id: &str) -> String {
        format!("{}/boxes/{}", self.api_base, box_id)
    }

    /// Fetch the latest temperature reading for one senseBox.
    pub async fn fetch(&self, box_id: &str) -> Result<Reading, FetchError> {
        let url = self.box_url(box_id);
        tracing::debug!(%box_id, %url, "requesting senseBox");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Unreachable {
                box_id: box_id.to_string(),
                detail: e.to_string(),
            })?;

        let payload: BoxPayload =
            response
                .json()
                .await
                .map_err(|e| FetchError::MalformedResponse {
                    box_id: box_id.to_string(),
                    detail: e.to_string(),
                })?;

        reading_from_payload(box_id, &payload, &self.phenomenon, self.freshness, Utc::now())
    }

    /// Lightweight reachability probe used by the readiness check.
    pub async fn is_accessible(&self, box_id: &str) -> bool {
        match self.http.get(self.box_url(box_id)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(%box_id, error = %e, "senseBox probe failed");
                false
            }
        }
    }
}

/// Extract the temperature measurement from a box document and validate its
/// freshness. Split out of `fetch` so parsing is testable without a network.
pub fn reading_from_payload(
    box_id: &str,
    payload: &BoxPayload,
    phenomenon: &str,
    freshness: Duration,
    now: DateTime<Utc>,
) -> Result<Reading, FetchError> {
    let malformed = |detail: &str| FetchError::MalformedResponse {
        box_id: box_id.to_string(),
        detail: detail.to_string(),
    };

    let sensor = payload
        .sensors
        .iter()
        .find(|s| s.title.as_deref() == Some(phenomenon))
        .ok_or_else(|| malformed("no sensor matching the temperature phenomenon"))?;

    let measurement = sensor
        .last_measurement
        .as_ref()
        .ok_or_else(|| malformed("sensor has no lastMeasurement"))?;

    // The API reports the value as a JSON string; tolerate a bare number too.
    let value = match measurement.value.as_ref() {
        Some(serde_json::Value::String(s)) => s
            .parse::<f64>()
            .map_err(|_| malformed("measurement value is not a number"))?,
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| malformed("measurement value is not a number"))?,
        _ => return Err(malformed("measurement has no value")),
    };

    let created_at = measurement
        .created_at
        .as_deref()
        .ok_or_else(|| malformed("measurement has no createdAt"))?;
    let observed_at = DateTime::parse_from_rfc3339(created_at)
        .map_err(|_| malformed("measurement createdAt is not a valid timestamp"))?
        .with_timezone(&Utc);

    let age = now - observed_at;
    if age > freshness {
        return Err(FetchError::Stale {
            box_id: box_id.to_string(),
            age_seconds: age.num_seconds(),
        });
    }

    Ok(Reading {
        box_id: box_id.to_string(),
        temperature_celsius: value,
        observed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload_with(title: &str, value: serde_json::Value, created_at: &str) -> BoxPayload {
        serde_json::from_value(json!({
            "sensors": [
                { "title": "rel. Luftfeuchte", "lastMeasurement": { "value": "55.1", "createdAt": created_at } },
                { "title": title, "lastMeasurement": { "value": value, "createdAt": created_at } },
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_extracts_value_and_timestamp() {
        let now = Utc::now();
        let created = (now - Duration::minutes(10)).to_rfc3339();
        let payload = payload_with("Temperatur", json!("21.37"), &created);

        let reading =
            reading_from_payload("box-a", &payload, "Temperatur", Duration::hours(1), now).unwrap();
        assert_eq!(reading.box_id, "box-a");
        assert_eq!(reading.temperature_celsius, 21.37);
        assert_eq!(reading.observed_at.to_rfc3339(), created);
    }

    #[test]
    fn test_accepts_bare_numeric_value() {
        let now = Utc::now();
        let created = now.to_rfc3339();
        let payload = payload_with("Temperatur", json!(19.5), &created);

        let reading =
            reading_from_payload("box-a", &payload, "Temperatur", Duration::hours(1), now).unwrap();
        assert_eq!(reading.temperature_celsius, 19.5);
    }

    #[test]
    fn test_missing_phenomenon_is_malformed() {
        let now = Utc::now();
        let payload = payload_with("PM2.5", json!("8.0"), &now.to_rfc3339());

        let err = reading_from_payload("box-a", &payload, "Temperatur", Duration::hours(1), now)
            .unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }

    #[test]
    fn test_unparseable_value_is_malformed() {
        let now = Utc::now();
        let payload = payload_with("Temperatur", json!("warm"), &now.to_rfc3339());

        let err = reading_from_payload("box-a", &payload, "Temperatur", Duration::hours(1), now)
            .unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }

    #[test]
    fn test_old_measurement_is_stale() {
        let now = Utc::now();
        let created = (now - Duration::hours(2)).to_rfc3339();
        let payload = payload_with("Temperatur", json!("21.0"), &created);

        let err = reading_from_payload("box-a", &payload, "Temperatur", Duration::hours(1), now)
            .unwrap_err();
        match err {
            FetchError::Stale { age_seconds, .. } => assert_eq!(age_seconds, 7200),
            other => panic!("expected Stale, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_sensors_is_malformed() {
        let payload: BoxPayload = serde_json::from_value(json!({})).unwrap();
        let err = reading_from_payload(
            "box-a",
            &payload,
            "Temperatur",
            Duration::hours(1),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }
}

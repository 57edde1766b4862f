//! Cross-box temperature aggregation and status classification.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::cache::ReadingCache;
use crate::model::BoxId;

/// Result of averaging the currently valid cached readings.
#[derive(Debug, Clone, Serialize)]
pub struct Aggregate {
    pub average_temperature: f64,
    pub status: &'static str,
    /// Boxes that contributed to the average, sorted for determinism.
    pub sources: Vec<BoxId>,
}

/// Status label for an average temperature.
pub fn status_for(temperature: f64) -> &'static str {
    if temperature < 10.0 {
        "Too Cold"
    } else if temperature <= 36.0 {
        "Good"
    } else {
        "Too Hot"
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean of `temperature_celsius` over one reading per box, restricted to
/// entries fetched within `max_age`. Returns `None` when no valid entry
/// exists, regardless of how many stale ones do.
pub fn compute(cache: &ReadingCache, max_age: Duration, now: DateTime<Utc>) -> Option<Aggregate> {
    let valid = cache.get_valid_at(max_age, now);
    if valid.is_empty() {
        return None;
    }

    let sum: f64 = valid.values().map(|r| r.temperature_celsius).sum();
    let average = round2(sum / valid.len() as f64);

    let mut sources: Vec<BoxId> = valid.into_keys().collect();
    sources.sort();

    Some(Aggregate {
        average_temperature: average,
        status: status_for(average),
        sources,
    })
}

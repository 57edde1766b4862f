//! In-memory cache of the most recent valid reading per senseBox.
//!
//! Entries are overwritten on every successful fetch and never evicted;
//! staleness is expressed purely through the age filter on reads, so a
//! failing box's last good reading stays visible (but excluded from
//! freshness-bounded reads) indefinitely.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

use crate::model::{BoxId, CacheEntry, Reading};

#[derive(Default)]
pub struct ReadingCache {
    entries: RwLock<HashMap<BoxId, CacheEntry>>,
}

impl ReadingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the entry for the reading's box, stamped with the current time.
    pub fn update(&self, reading: Reading) {
        self.update_at(reading, Utc::now());
    }

    pub fn update_at(&self, reading: Reading, fetched_at: DateTime<Utc>) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(reading.box_id.clone(), CacheEntry { reading, fetched_at });
    }

    /// Readings whose `fetched_at` lies within `max_age` of now.
    ///
    /// Pure filter; never mutates state and is safe to call concurrently
    /// with updates.
    pub fn get_valid(&self, max_age: Duration) -> HashMap<BoxId, Reading> {
        self.get_valid_at(max_age, Utc::now())
    }

    pub fn get_valid_at(&self, max_age: Duration, now: DateTime<Utc>) -> HashMap<BoxId, Reading> {
        let entries = self.entries.read().unwrap();
        entries
            .iter()
            .filter(|(_, entry)| now - entry.fetched_at <= max_age)
            .map(|(id, entry)| (id.clone(), entry.reading.clone()))
            .collect()
    }

    /// Maximum staleness among all present entries; `None` when empty.
    pub fn oldest_age(&self) -> Option<Duration> {
        self.oldest_age_at(Utc::now())
    }

    pub fn oldest_age_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let entries = self.entries.read().unwrap();
        entries.values().map(|entry| now - entry.fetched_at).max()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(box_id: &str, temp: f64) -> Reading {
        Reading {
            box_id: box_id.to_string(),
            temperature_celsius: temp,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_update_then_get_valid_returns_entry() {
        let cache = ReadingCache::new();
        let now = Utc::now();
        cache.update_at(reading("box-a", 21.5), now);

        let valid = cache.get_valid_at(Duration::hours(1), now);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid["box-a"].temperature_celsius, 21.5);
    }

    #[test]
    fn test_entry_excluded_after_max_age() {
        let cache = ReadingCache::new();
        let now = Utc::now();
        cache.update_at(reading("box-a", 21.5), now);

        let later = now + Duration::hours(1) + Duration::seconds(1);
        let valid = cache.get_valid_at(Duration::hours(1), later);
        assert!(valid.is_empty());

        // The entry itself is still present, just filtered.
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_last_write_wins_per_box() {
        let cache = ReadingCache::new();
        let now = Utc::now();
        cache.update_at(reading("box-a", 10.0), now - Duration::minutes(5));
        cache.update_at(reading("box-a", 12.0), now);

        let valid = cache.get_valid_at(Duration::hours(1), now);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid["box-a"].temperature_celsius, 12.0);
    }

    #[test]
    fn test_concurrent_updates_never_interleave_fields() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(ReadingCache::new());
        let base = Utc::now();

        // Each writer stamps a reading whose temperature, observed_at and
        // fetched_at are all derived from its own index, so a torn entry
        // would show mismatched fields.
        let handles: Vec<_> = (0..8i64)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..200 {
                        cache.update_at(
                            Reading {
                                box_id: "box-a".to_string(),
                                temperature_celsius: i as f64,
                                observed_at: base + Duration::seconds(i),
                            },
                            base + Duration::seconds(i),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let now = base + Duration::seconds(10);
        let valid = cache.get_valid_at(Duration::hours(1), now);
        let survivor = &valid["box-a"];

        // Exactly one writer's reading survives, with all fields from the
        // same attempt.
        let i = survivor.temperature_celsius as i64;
        assert!((0..8).contains(&i));
        assert_eq!(survivor.observed_at, base + Duration::seconds(i));
        assert_eq!(
            cache.oldest_age_at(now).unwrap(),
            Duration::seconds(10 - i)
        );
    }

    #[test]
    fn test_oldest_age_reports_maximum_staleness() {
        let cache = ReadingCache::new();
        let now = Utc::now();
        assert!(cache.oldest_age_at(now).is_none());

        cache.update_at(reading("box-a", 20.0), now - Duration::seconds(30));
        cache.update_at(reading("box-b", 22.0), now - Duration::seconds(360));

        let age = cache.oldest_age_at(now).unwrap();
        assert_eq!(age.num_seconds(), 360);
    }
}

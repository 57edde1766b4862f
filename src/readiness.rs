//! Composite readiness signal.
//!
//! Not-ready requires BOTH clauses: more than 50% of the configured boxes
//! are inaccessible AND the cache is older than the configured maximum (an
//! empty cache counts as infinitely stale). A fully-down box set with a
//! still-fresh cache stays ready, as does a flaky box alongside fresh data
//! from the others.

use futures_util::future::join_all;
use serde::Serialize;

use crate::state::AppState;

/// Snapshot of the readiness inputs and verdict. Recomputed fresh on every
/// check, never cached.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessSnapshot {
    pub accessible: usize,
    pub total: usize,
    pub inaccessible: usize,
    pub cache_age_seconds: Option<i64>,
    pub max_age_seconds: i64,
    pub ready: bool,
    pub reason: Option<String>,
}

/// The readiness decision as a pure function of its inputs.
pub fn decide(
    accessible: usize,
    total: usize,
    cache_age_seconds: Option<i64>,
    max_age_seconds: i64,
) -> (bool, Option<String>) {
    let inaccessible = total - accessible;
    let too_many_inaccessible = inaccessible > total / 2;

    let cache_too_old = match cache_age_seconds {
        Some(age) => age > max_age_seconds,
        None => true,
    };

    if too_many_inaccessible && cache_too_old {
        let minutes = max_age_seconds / 60;
        let reason = format!(
            "More than 50% of senseBoxes are inaccessible ({inaccessible}/{total}) \
             and cached data is older than {minutes} minutes."
        );
        (false, Some(reason))
    } else {
        (true, None)
    }
}

/// Probe every configured box concurrently and combine reachability with
/// cache age into a verdict.
pub async fn evaluate(state: &AppState) -> ReadinessSnapshot {
    let probes = state
        .settings
        .box_ids
        .iter()
        .map(|id| state.client.is_accessible(id));
    let results = join_all(probes).await;

    let total = state.settings.box_ids.len();
    let accessible = results.into_iter().filter(|up| *up).count();
    let cache_age_seconds = state.cache.oldest_age().map(|age| age.num_seconds());
    let max_age_seconds = state.settings.cache_max_age_seconds as i64;

    let (ready, reason) = decide(accessible, total, cache_age_seconds, max_age_seconds);
    if !ready {
        tracing::warn!(
            inaccessible = total - accessible,
            total,
            ?cache_age_seconds,
            "readiness check failed"
        );
    }

    ReadinessSnapshot {
        accessible,
        total,
        inaccessible: total - accessible,
        cache_age_seconds,
        max_age_seconds,
        ready,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_majority_down_and_stale_cache_is_not_ready() {
        let (ready, reason) = decide(1, 3, Some(360), 300);
        assert!(!ready);
        let reason = reason.unwrap();
        assert!(reason.contains("(2/3)"));
        assert!(reason.contains("5 minutes"));
    }

    #[test]
    fn test_fresh_cache_saves_a_down_majority() {
        let (ready, reason) = decide(1, 3, Some(45), 300);
        assert!(ready);
        assert!(reason.is_none());
    }

    #[test]
    fn test_full_accessibility_is_ready_regardless_of_cache() {
        let (ready, _) = decide(3, 3, None, 300);
        assert!(ready);

        let (ready, _) = decide(3, 3, Some(100_000), 300);
        assert!(ready);
    }

    #[test]
    fn test_empty_cache_counts_as_stale() {
        let (ready, reason) = decide(0, 3, None, 300);
        assert!(!ready);
        assert!(reason.unwrap().contains("(3/3)"));
    }

    #[test]
    fn test_exactly_half_down_is_not_a_majority() {
        // 2 of 4 inaccessible is not "more than 50%".
        let (ready, _) = decide(2, 4, None, 300);
        assert!(ready);
    }

    #[test]
    fn test_reason_string_verbatim() {
        let (_, reason) = decide(1, 3, None, 300);
        assert_eq!(
            reason.unwrap(),
            "More than 50% of senseBoxes are inaccessible (2/3) \
             and cached data is older than 5 minutes."
        );
    }
}

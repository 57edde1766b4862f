//! Background driver: periodic senseBox refresh and periodic storage flush.
//!
//! Two independent timer loops, each honoring the broadcast shutdown
//! signal. One box's failure never blocks or aborts the cycle for the
//! others; flush failures leave the batch intact for the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;

use crate::metrics;
use crate::state::AppState;

pub async fn run_refresh(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let mut tick = interval(Duration::from_secs(state.settings.refresh_interval_seconds));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("refresh task received shutdown signal");
                break;
            }
            _ = tick.tick() => {
                refresh_once(&state).await;
            }
        }
    }
}

/// Fetch every configured box once; successes update the cache and enter
/// the durable buffer.
pub async fn refresh_once(state: &AppState) {
    for box_id in &state.settings.box_ids {
        match state.client.fetch(box_id).await {
            Ok(reading) => {
                tracing::debug!(
                    %box_id,
                    temperature = reading.temperature_celsius,
                    "refreshed senseBox"
                );
                state.cache.update(reading.clone());
                state.buffer.enqueue(reading);
            }
            Err(e) => {
                tracing::warn!(%box_id, error = %e, "senseBox refresh failed");
            }
        }
    }

    if let Some(age) = state.cache.oldest_age() {
        metrics::TEMPERATURE_DATA_AGE_SECONDS.set(age.num_seconds() as f64);
    }
}

pub async fn run_flush(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let mut tick = interval(Duration::from_secs(state.settings.flush_interval_seconds));
    // The first interval tick fires immediately; skip it so the initial
    // flush happens one full interval after startup.
    tick.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("flush task received shutdown signal");
                break;
            }
            _ = tick.tick() => {
                flush_once(&state).await;
            }
        }
    }
}

pub async fn flush_once(state: &AppState) {
    let Some(store) = &state.store else {
        tracing::debug!("storage not configured; skipping flush cycle");
        return;
    };

    match state.buffer.flush(store.as_ref()).await {
        Ok(0) => tracing::debug!("nothing to flush"),
        Ok(count) => {
            metrics::STORAGE_WRITE_OPERATIONS_TOTAL
                .with_label_values(&["batch", "success"])
                .inc();
            tracing::info!(count, "flushed reading batch to storage");
        }
        Err(e) => {
            metrics::STORAGE_WRITE_OPERATIONS_TOTAL
                .with_label_values(&["batch", "failure"])
                .inc();
            tracing::warn!(error = %e, "storage flush failed; batch retained for retry");
        }
    }
}

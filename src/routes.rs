//! HTTP interface.
//!
//! Thin axum handlers over the core: the request path reads the cache and
//! buffer only and never triggers a synchronous senseBox fetch, so request
//! latency stays decoupled from source reachability.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use chrono::Utc;
use serde_json::json;

use crate::state::AppState;
use crate::storage::StoreError;
use crate::{aggregate, metrics, readiness};

#[derive(Debug)]
pub enum AppError {
    /// No valid cached reading exists to aggregate.
    NoData { freshness_seconds: u64 },
    /// Flush failed or storage is unconfigured.
    Store(StoreError),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_json) = match self {
            AppError::NoData { freshness_seconds } => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "No temperature data available",
                    "message": format!(
                        "Unable to retrieve fresh temperature data from senseBoxes. \
                         Data may be unavailable or older than {freshness_seconds} seconds."
                    ),
                }),
            ),
            AppError::Store(StoreError::NotConfigured) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "Storage not configured",
                    "message": "Unable to flush temperature data to storage.",
                }),
            ),
            AppError::Store(StoreError::Unavailable(detail)) => {
                tracing::error!(%detail, "storage backend unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({
                        "error": "Storage unavailable",
                        "message": "Unable to flush temperature data to storage.",
                    }),
                )
            }
        };
        (status, Json(error_json)).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/temperature", get(temperature))
        .route("/store", post(store))
        .route("/readyz", get(readyz))
        .route("/version", get(version))
        .route("/metrics", get(metrics_endpoint))
        .layer(middleware::from_fn(metrics::track_http))
        .with_state(state)
}

/// Average temperature over the currently valid cached readings.
async fn temperature(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let aggregate = aggregate::compute(&state.cache, state.settings.freshness_window(), Utc::now())
        .ok_or(AppError::NoData {
            freshness_seconds: state.settings.freshness_window_seconds,
        })?;

    tracing::info!(
        average = aggregate.average_temperature,
        sources = aggregate.sources.len(),
        "serving temperature"
    );

    Ok(Json(json!({
        "average_temperature": aggregate.average_temperature,
        "status": aggregate.status,
    })))
}

/// Flush buffered readings to the storage backend on demand.
async fn store(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let backend = state
        .store
        .as_ref()
        .ok_or(AppError::Store(StoreError::NotConfigured))?;

    match state.buffer.flush(backend.as_ref()).await {
        // Nothing was written; don't count a storage operation.
        Ok(0) => Ok(Json(json!({ "flushed": 0 }))),
        Ok(flushed) => {
            metrics::STORAGE_WRITE_OPERATIONS_TOTAL
                .with_label_values(&["batch", "success"])
                .inc();
            Ok(Json(json!({ "flushed": flushed })))
        }
        Err(e) => {
            metrics::STORAGE_WRITE_OPERATIONS_TOTAL
                .with_label_values(&["batch", "failure"])
                .inc();
            Err(e.into())
        }
    }
}

/// Readiness probe; 200 when ready, 503 otherwise.
async fn readyz(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = readiness::evaluate(&state).await;

    let mut body = json!({
        "status": if snapshot.ready { "ready" } else { "not_ready" },
        "sensebox": {
            "accessible": snapshot.accessible,
            "total": snapshot.total,
            "inaccessible": snapshot.inaccessible,
        },
        "cache": {
            "age_seconds": snapshot.cache_age_seconds,
            "max_age_seconds": snapshot.max_age_seconds,
        },
    });
    if let Some(reason) = &snapshot.reason {
        body["reason"] = json!(reason);
    }

    let status = if snapshot.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

async fn version() -> impl IntoResponse {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn metrics_endpoint() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

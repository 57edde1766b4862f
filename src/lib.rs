//! HiveBox: freshness-aware temperature aggregation over openSenseMap
//! senseBoxes, with durable MinIO snapshots and a composite readiness probe.

pub mod aggregate;
pub mod buffer;
pub mod cache;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod readiness;
pub mod routes;
pub mod scheduler;
pub mod sensebox;
pub mod state;
pub mod storage;

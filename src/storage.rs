//! Durable storage backend for flushed reading batches.
//!
//! The production backend is an S3-compatible object store (MinIO),
//! addressed path-style and authenticated with AWS Signature V4 over plain
//! `reqwest`. The `StorageBackend` trait is the seam that lets the buffer
//! and scheduler run against fakes in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use sha2::{Digest, Sha256};
use std::env;
use std::time::Duration as StdDuration;
use thiserror::Error;
use tokio::time::sleep;

use crate::model::Reading;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend is not configured")]
    NotConfigured,

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Batch-write seam between the buffer and the object store.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Verify the backend is reachable and the bucket exists (creating it
    /// when configured to do so).
    async fn ensure_bucket(&self) -> Result<(), StoreError>;

    /// Persist one batch of readings as a single operation.
    async fn put_batch(&self, readings: &[Reading]) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct MinioConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub secure: bool,
    pub region: String,
    pub create_bucket: bool,
    pub timeout_seconds: u64,
}

fn bool_env(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(
            v.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        Err(_) => default,
    }
}

impl MinioConfig {
    /// Read the backend configuration from the environment. Returns `None`
    /// when any required field is absent; the service then runs without
    /// durable storage and flushes report `NotConfigured`.
    pub fn from_env() -> Option<Self> {
        let endpoint = env::var("MINIO_ENDPOINT").ok()?;
        let access_key = env::var("MINIO_ACCESS_KEY").ok()?;
        let secret_key = env::var("MINIO_SECRET_KEY").ok()?;
        let bucket = env::var("MINIO_BUCKET").ok()?;

        let timeout_seconds = env::var("MINIO_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        Some(Self {
            endpoint,
            access_key,
            secret_key,
            bucket,
            secure: bool_env("MINIO_SECURE", true),
            region: env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            create_bucket: bool_env("MINIO_CREATE_BUCKET", false),
            timeout_seconds,
        })
    }
}

pub struct MinioStore {
    http: Client,
    config: MinioConfig,
}

impl MinioStore {
    pub fn new(config: MinioConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(StdDuration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { http, config })
    }

    /// Build a store from `MINIO_*` environment variables, or `None` when
    /// storage is unconfigured.
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        match MinioConfig::from_env() {
            Some(config) => Ok(Some(Self::new(config)?)),
            None => {
                tracing::info!("MinIO config not provided; running without durable storage");
                Ok(None)
            }
        }
    }

    fn scheme(&self) -> &'static str {
        if self.config.secure { "https" } else { "http" }
    }

    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<reqwest::Response, StoreError> {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let payload_hash = sha256_hex(&body);

        let canonical = canonical_request(
            method.as_str(),
            path,
            &self.config.endpoint,
            &payload_hash,
            &amz_date,
        );
        let authorization = authorization_header(
            &self.config.access_key,
            &self.config.secret_key,
            &self.config.region,
            &canonical,
            &amz_date,
            &date_stamp,
        );

        let url = format!("{}://{}{}", self.scheme(), self.config.endpoint, path);
        let mut request = self
            .http
            .request(method, &url)
            .header("x-amz-date", &amz_date)
            .header("x-amz-content-sha256", &payload_hash)
            .header("authorization", authorization);
        if let Some(ct) = content_type {
            request = request.header("content-type", ct);
        }

        request
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl StorageBackend for MinioStore {
    async fn ensure_bucket(&self) -> Result<(), StoreError> {
        let bucket_path = format!("/{}", self.config.bucket);
        let response = self
            .signed_request(Method::HEAD, &bucket_path, Vec::new(), None)
            .await?;

        if response.status().is_success() {
            return Ok(());
        }
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            if !self.config.create_bucket {
                return Err(StoreError::Unavailable(
                    "bucket does not exist and bucket creation is disabled".to_string(),
                ));
            }
            let created = self
                .signed_request(Method::PUT, &bucket_path, Vec::new(), None)
                .await?;
            if created.status().is_success() {
                tracing::info!(bucket = %self.config.bucket, "created MinIO bucket");
                return Ok(());
            }
            return Err(StoreError::Unavailable(format!(
                "failed to create bucket: HTTP {}",
                created.status()
            )));
        }

        Err(StoreError::Unavailable(format!(
            "bucket check failed: HTTP {}",
            response.status()
        )))
    }

    async fn put_batch(&self, readings: &[Reading]) -> Result<(), StoreError> {
        if readings.is_empty() {
            return Ok(());
        }

        let key = object_key(Utc::now());
        let body = serde_json::to_vec(readings)
            .map_err(|e| StoreError::Unavailable(format!("failed to encode batch: {e}")))?;
        let path = format!("/{}/{}", self.config.bucket, key);

        let response = self
            .signed_request(Method::PUT, &path, body, Some("application/json"))
            .await?;
        if !response.status().is_success() {
            return Err(StoreError::Unavailable(format!(
                "batch write rejected: HTTP {}",
                response.status()
            )));
        }

        tracing::debug!(count = readings.len(), %key, "wrote reading batch");
        Ok(())
    }
}

/// Object key for one flushed batch, bucketed by UTC date.
pub fn object_key(now: DateTime<Utc>) -> String {
    now.format("readings/%Y/%m/%d/%H%M%S.json").to_string()
}

/// Block startup until the configured backend answers, with bounded retries
/// and a linearly growing delay between attempts.
pub async fn wait_until_ready(store: &dyn StorageBackend) -> anyhow::Result<()> {
    const MAX_ATTEMPTS: u64 = 12;
    const RETRY_DELAY_SECONDS: u64 = 2;

    let mut attempt = 0;
    loop {
        attempt += 1;
        match store.ensure_bucket().await {
            Ok(()) => {
                tracing::info!(attempt, "MinIO connection established");
                return Ok(());
            }
            Err(e) if attempt < MAX_ATTEMPTS => {
                let wait = RETRY_DELAY_SECONDS * attempt;
                tracing::warn!(attempt, error = %e, "MinIO not ready, retrying in {wait}s");
                sleep(StdDuration::from_secs(wait)).await;
            }
            Err(e) => {
                anyhow::bail!("storage backend not ready after {MAX_ATTEMPTS} attempts: {e}");
            }
        }
    }
}

// --- AWS Signature V4 ---

const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn canonical_request(
    method: &str,
    path: &str,
    host: &str,
    payload_hash: &str,
    amz_date: &str,
) -> String {
    // Keys written by this service contain no characters requiring
    // additional URI encoding, and no query string is ever used.
    format!(
        "{method}\n{path}\n\nhost:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{payload_hash}"
    )
}

fn authorization_header(
    access_key: &str,
    secret_key: &str,
    region: &str,
    canonical: &str,
    amz_date: &str,
    date_stamp: &str,
) -> String {
    let scope = format!("{date_stamp}/{region}/s3/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        sha256_hex(canonical.as_bytes())
    );

    let key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
    let key = hmac_sha256(&key, region.as_bytes());
    let key = hmac_sha256(&key, b"s3");
    let key = hmac_sha256(&key, b"aws4_request");
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    format!(
        "AWS4-HMAC-SHA256 Credential={access_key}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_object_key_is_date_bucketed() {
        let at = Utc.with_ymd_and_hms(2026, 3, 7, 14, 5, 9).unwrap();
        assert_eq!(object_key(at), "readings/2026/03/07/140509.json");
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_canonical_request_shape() {
        let payload_hash = sha256_hex(b"{}");
        let canonical = canonical_request(
            "PUT",
            "/readings-bucket/readings/2026/03/07/140509.json",
            "minio.local:9000",
            &payload_hash,
            "20260307T140509Z",
        );

        let lines: Vec<&str> = canonical.split('\n').collect();
        assert_eq!(lines[0], "PUT");
        assert_eq!(lines[1], "/readings-bucket/readings/2026/03/07/140509.json");
        assert_eq!(lines[2], ""); // empty canonical query string
        assert_eq!(lines[3], "host:minio.local:9000");
        assert_eq!(lines[6], ""); // blank line terminating canonical headers
        assert_eq!(lines[7], SIGNED_HEADERS);
        assert_eq!(lines[8], payload_hash);
    }

    #[test]
    fn test_authorization_header_carries_credential_scope() {
        let auth = authorization_header(
            "minioadmin",
            "miniosecret",
            "us-east-1",
            "PUT\n/b/k\n\nhost:h\nx-amz-content-sha256:x\nx-amz-date:d\n\nsigned\nx",
            "20260307T140509Z",
            "20260307",
        );
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=minioadmin/20260307/us-east-1/s3/aws4_request"
        ));
        assert!(auth.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
        assert!(auth.contains("Signature="));
    }
}

//! Shared application state.
//!
//! One explicitly owned context object handed to the router and the
//! background tasks; no ambient singletons. The scheduler is the sole
//! writer of fetched data, `/store` is a second, rarer writer of the
//! buffer only, and request handlers read concurrently.

use std::sync::Arc;

use crate::buffer::RecordBuffer;
use crate::cache::ReadingCache;
use crate::config::Settings;
use crate::sensebox::SenseBoxClient;
use crate::storage::StorageBackend;

pub struct AppState {
    pub settings: Settings,
    pub cache: ReadingCache,
    pub buffer: RecordBuffer,
    pub client: SenseBoxClient,
    pub store: Option<Arc<dyn StorageBackend>>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        store: Option<Arc<dyn StorageBackend>>,
    ) -> anyhow::Result<Arc<Self>> {
        let client = SenseBoxClient::new(&settings)?;
        Ok(Arc::new(Self {
            settings,
            cache: ReadingCache::new(),
            buffer: RecordBuffer::new(),
            client,
            store,
        }))
    }
}

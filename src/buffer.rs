//! In-memory batch of readings pending durable persistence.
//!
//! Flush uses snapshot-then-clear semantics: the batch is snapshotted under
//! the lock, written to the backend with no lock held, and only the
//! snapshotted prefix is removed on success. Entries enqueued while a flush
//! is in flight land in the next flush; a failed flush leaves the batch
//! fully intact for retry. Flushes themselves are serialized: the timer
//! cycle and the explicit store trigger are both flush callers, and an
//! overlapping pair must not persist the same snapshot twice.

use std::sync::Mutex;

use crate::model::Reading;
use crate::storage::{StorageBackend, StoreError};

#[derive(Default)]
pub struct RecordBuffer {
    batch: Mutex<Vec<Reading>>,
    // Held across snapshot, backend write and clear so concurrent flush
    // callers run one at a time. `enqueue` never takes this lock.
    flush_gate: tokio::sync::Mutex<()>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reading to the pending batch. Never performs I/O.
    pub fn enqueue(&self, reading: Reading) {
        self.batch.lock().unwrap().push(reading);
    }

    pub fn len(&self) -> usize {
        self.batch.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.lock().unwrap().is_empty()
    }

    /// Persist the current batch to `store` and return the number flushed.
    ///
    /// An empty batch returns `Ok(0)` without touching the backend. Errors
    /// are not retried here; the scheduler retries on its next cycle.
    pub async fn flush(&self, store: &dyn StorageBackend) -> Result<usize, StoreError> {
        let _flushing = self.flush_gate.lock().await;

        let snapshot = {
            let batch = self.batch.lock().unwrap();
            if batch.is_empty() {
                return Ok(0);
            }
            batch.clone()
        };

        store.put_batch(&snapshot).await?;

        // Drop exactly the snapshotted prefix; later enqueues survive.
        let mut batch = self.batch.lock().unwrap();
        batch.drain(..snapshot.len());
        Ok(snapshot.len())
    }
}

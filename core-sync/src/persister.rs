//! Batched persister
//!
//! Writes upsert operations in groups no larger than the store allows. Each
//! group is atomic. A failing group stops the run; groups already committed
//! stay committed and the error reports how many documents made it.

use crate::error::{Result, SyncError};
use core_library::{LikedSongStore, UpsertKind, UpsertOp};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Counts from a completed persist run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub inserted: usize,
    pub updated: usize,
    /// Number of store commits issued
    pub batches: usize,
}

impl PersistReport {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

pub struct BatchPersister {
    store: Arc<dyn LikedSongStore>,
    batch_size: usize,
}

impl BatchPersister {
    /// `batch_size` is clamped to `1..=store.max_batch_size()`.
    pub fn new(store: Arc<dyn LikedSongStore>, batch_size: usize) -> Self {
        let batch_size = batch_size.clamp(1, store.max_batch_size().max(1));
        Self { store, batch_size }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Commit `ops` group by group. `on_batch` receives `(committed, total)`
    /// after every successful group.
    #[instrument(skip(self, ops, on_batch), fields(total = ops.len(), batch_size = self.batch_size))]
    pub async fn persist<F>(&self, ops: Vec<UpsertOp>, mut on_batch: F) -> Result<PersistReport>
    where
        F: FnMut(usize, usize) + Send,
    {
        let total = ops.len();
        let mut report = PersistReport::default();
        let mut committed = 0usize;

        for chunk in ops.chunks(self.batch_size) {
            if let Err(source) = self.store.commit_batch(chunk).await {
                warn!(committed, total, error = %source, "Batch commit failed, stopping");
                return Err(SyncError::Persist {
                    committed,
                    total,
                    source,
                });
            }

            committed += chunk.len();
            report.batches += 1;
            for op in chunk {
                match op.kind {
                    UpsertKind::Insert => report.inserted += 1,
                    UpsertKind::Update => report.updated += 1,
                }
            }

            debug!(committed, total, "Batch committed");
            on_batch(committed, total);
        }

        Ok(report)
    }
}

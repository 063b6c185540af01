//! # Pending-Operation Queue
//!
//! Ordered list of local mutations not yet confirmed against the backend,
//! persisted in the local store so a restart does not lose unsynced work.
//!
//! ## Features
//!
//! - **Coalescing**: at most one live operation per entity — a later Update
//!   replaces a queued Create/Update payload, and a Delete cancels a queued
//!   Create outright (the entity never existed remotely)
//! - **FIFO Batches**: operations are handed out in enqueue order, filtered
//!   by the retry backoff schedule
//! - **Terminal Failures**: operations that exhaust the attempt ceiling are
//!   parked, excluded from automatic retry, and kept visible until the user
//!   retries or discards them
//! - **High-Water Warning**: an oversized queue logs a warning; operations
//!   are never dropped silently

use crate::error::StoreError;
use crate::model::{OperationKind, PendingOperation};
use crate::offline::retry::BackoffPolicy;
use crate::store::LocalStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistent queue of pending operations.
///
/// Owned by the auto-sync manager; no other component mutates it.
#[derive(Debug)]
pub struct PendingQueue {
    store: Arc<LocalStore>,
    backoff: BackoffPolicy,
    max_attempts: u32,
    high_water: usize,
}

impl PendingQueue {
    /// Create a queue over the given store.
    pub fn new(
        store: Arc<LocalStore>,
        backoff: BackoffPolicy,
        max_attempts: u32,
        high_water: usize,
    ) -> Self {
        Self {
            store,
            backoff,
            max_attempts,
            high_water,
        }
    }

    /// Enqueue an operation, coalescing against queued work for the same
    /// entity.
    ///
    /// Invariant afterwards: at most one live operation per
    /// `(collection, entity id)` pair.
    pub async fn enqueue(&self, op: PendingOperation) -> Result<()> {
        let existing = self
            .store
            .queue_active_for_entity(&op.collection, op.entity_id())
            .await?;

        match op.kind {
            OperationKind::Delete => {
                let had_create = existing.iter().any(|e| e.kind == OperationKind::Create);
                if !existing.is_empty() {
                    self.store
                        .queue_remove_active_for_entity(&op.collection, op.entity_id())
                        .await?;
                }
                if had_create {
                    // the entity was never synced; deleting it locally means
                    // the backend must never hear about it at all
                    tracing::debug!(
                        collection = %op.collection,
                        entity = %op.entity_id(),
                        "delete cancelled unsynced create"
                    );
                    return Ok(());
                }
                self.store.queue_insert(&op).await?;
            }
            OperationKind::Create | OperationKind::Update => {
                match existing.first() {
                    Some(prev) if prev.kind != OperationKind::Delete => {
                        // keep the earlier slot (FIFO position and kind),
                        // carry the newest entity snapshot
                        self.store.queue_replace_entity(prev.id, &op.entity).await?;
                    }
                    Some(_) => {
                        // recreate after a queued delete: the delete never
                        // reached the backend, so this becomes a fresh create
                        self.store
                            .queue_remove_active_for_entity(&op.collection, op.entity_id())
                            .await?;
                        let recreate = PendingOperation {
                            kind: OperationKind::Create,
                            ..op
                        };
                        self.store.queue_insert(&recreate).await?;
                    }
                    None => {
                        self.store.queue_insert(&op).await?;
                    }
                }
            }
        }

        let depth = self.store.queue_total_len().await?;
        if depth > self.high_water {
            tracing::warn!(
                depth,
                high_water = self.high_water,
                "pending queue above high-water mark; sync is falling behind"
            );
        }
        Ok(())
    }

    /// Up to `max` operations that are due for a push attempt at `now`,
    /// in FIFO enqueue order.
    pub async fn peek_batch(&self, max: usize, now: DateTime<Utc>) -> Result<Vec<PendingOperation>> {
        let pending = self.store.queue_pending_ordered().await?;
        Ok(pending
            .into_iter()
            .filter(|op| self.backoff.is_due(op, now))
            .take(max)
            .collect())
    }

    /// Remove successfully synced operations.
    pub async fn acknowledge(&self, ids: &[Uuid]) -> Result<()> {
        self.store.queue_remove(ids).await?;
        Ok(())
    }

    /// Record a transient push failure.
    ///
    /// Increments the attempt counter; crossing the attempt ceiling parks the
    /// operation in the terminal failed sub-state.
    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let attempts = self.store.queue_record_attempt(id, error, Utc::now()).await?;
        if attempts >= self.max_attempts {
            self.store.queue_set_failed(id, None).await?;
            tracing::warn!(
                operation = %id,
                attempts,
                error,
                "operation exceeded its retry limit and needs attention"
            );
        }
        Ok(())
    }

    /// Park an operation the backend rejected outright; it will never be
    /// retried automatically.
    pub async fn mark_rejected(&self, id: Uuid, error: &str) -> Result<()> {
        self.store.queue_record_attempt(id, error, Utc::now()).await?;
        self.store.queue_set_failed(id, Some(error)).await?;
        Ok(())
    }

    /// Newest `last_modified` among live queued operations for an entity.
    pub async fn newest_pending_for(
        &self,
        collection: &str,
        entity_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let ops = self.store.queue_active_for_entity(collection, entity_id).await?;
        Ok(ops.iter().map(|op| op.entity.last_modified).max())
    }

    /// Drop live queued operations for an entity that a newer remote change
    /// has superseded. Returns how many were dropped.
    pub async fn drop_superseded(&self, collection: &str, entity_id: &str) -> Result<u64> {
        self.store.queue_remove_active_for_entity(collection, entity_id).await
    }

    /// Number of operations queued for automatic sync.
    pub async fn count_pending(&self) -> Result<usize> {
        Ok(self.store.queue_counts().await?.0)
    }

    /// Number of operations in the terminal failed sub-state.
    pub async fn count_failed(&self) -> Result<usize> {
        Ok(self.store.queue_counts().await?.1)
    }

    /// The terminally failed operations, with their last error messages.
    pub async fn failed_operations(&self) -> Result<Vec<PendingOperation>> {
        self.store.queue_failed_ops().await
    }

    /// Return every terminally failed operation to the live queue.
    pub async fn retry_failed(&self) -> Result<u64> {
        self.store.queue_reset_failed().await
    }

    /// Drop every terminally failed operation.
    pub async fn discard_failed(&self) -> Result<u64> {
        self.store.queue_discard_failed().await
    }
}

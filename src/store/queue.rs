//! Pending-queue row storage
//!
//! Row-level SQL for the persisted `pending_queue` table. This is internal
//! plumbing: the coalescing and retry rules live in
//! [`crate::offline::queue::PendingQueue`], which is the only component that
//! calls these methods (via the auto-sync manager that owns it).

use super::{fmt_ts, parse_ts, LocalStore, Result};
use crate::error::StoreError;
use crate::model::{Entity, OperationKind, PendingOperation};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

impl LocalStore {
    /// Insert a queue row.
    pub(crate) async fn queue_insert(&self, op: &PendingOperation) -> Result<()> {
        let payload = serde_json::to_string(&op.entity.payload)?;
        sqlx::query(
            "INSERT INTO pending_queue
                 (id, collection, entity_id, kind, payload, last_modified, deleted,
                  created_at, attempts, last_attempt, last_error, failed)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(op.id.to_string())
        .bind(&op.collection)
        .bind(&op.entity.id)
        .bind(op.kind.as_str())
        .bind(payload)
        .bind(fmt_ts(op.entity.last_modified))
        .bind(op.entity.deleted as i64)
        .bind(fmt_ts(op.created_at))
        .bind(op.attempts as i64)
        .bind(op.last_attempt.map(fmt_ts))
        .bind(op.last_error.as_deref())
        .bind(op.failed as i64)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// All non-failed operations in FIFO enqueue order.
    pub(crate) async fn queue_pending_ordered(&self) -> Result<Vec<PendingOperation>> {
        let rows = sqlx::query(
            "SELECT * FROM pending_queue WHERE failed = 0
             ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(op_from_row).collect()
    }

    /// Non-failed operations targeting one entity, FIFO.
    pub(crate) async fn queue_active_for_entity(
        &self,
        collection: &str,
        entity_id: &str,
    ) -> Result<Vec<PendingOperation>> {
        let rows = sqlx::query(
            "SELECT * FROM pending_queue
             WHERE failed = 0 AND collection = ? AND entity_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(collection)
        .bind(entity_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(op_from_row).collect()
    }

    /// Replace the entity snapshot of a queued operation (coalescing).
    pub(crate) async fn queue_replace_entity(&self, op_id: Uuid, entity: &Entity) -> Result<()> {
        let payload = serde_json::to_string(&entity.payload)?;
        sqlx::query(
            "UPDATE pending_queue SET payload = ?, last_modified = ?, deleted = ? WHERE id = ?",
        )
        .bind(payload)
        .bind(fmt_ts(entity.last_modified))
        .bind(entity.deleted as i64)
        .bind(op_id.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Remove queue rows by operation id.
    pub(crate) async fn queue_remove(&self, ids: &[Uuid]) -> Result<u64> {
        let mut removed = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM pending_queue WHERE id = ?")
                .bind(id.to_string())
                .execute(self.pool())
                .await?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }

    /// Remove every non-failed operation targeting one entity.
    pub(crate) async fn queue_remove_active_for_entity(
        &self,
        collection: &str,
        entity_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM pending_queue WHERE failed = 0 AND collection = ? AND entity_id = ?",
        )
        .bind(collection)
        .bind(entity_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Record a failed push attempt and return the new attempt count.
    pub(crate) async fn queue_record_attempt(
        &self,
        op_id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<u32> {
        sqlx::query(
            "UPDATE pending_queue SET
                attempts = attempts + 1,
                last_attempt = ?,
                last_error = ?
             WHERE id = ?",
        )
        .bind(fmt_ts(at))
        .bind(error)
        .bind(op_id.to_string())
        .execute(self.pool())
        .await?;

        let row: (i64,) = sqlx::query_as("SELECT attempts FROM pending_queue WHERE id = ?")
            .bind(op_id.to_string())
            .fetch_one(self.pool())
            .await?;
        Ok(row.0 as u32)
    }

    /// Park an operation in the terminal failed sub-state.
    pub(crate) async fn queue_set_failed(&self, op_id: Uuid, error: Option<&str>) -> Result<()> {
        match error {
            Some(message) => {
                sqlx::query("UPDATE pending_queue SET failed = 1, last_error = ? WHERE id = ?")
                    .bind(message)
                    .bind(op_id.to_string())
                    .execute(self.pool())
                    .await?;
            }
            None => {
                sqlx::query("UPDATE pending_queue SET failed = 1 WHERE id = ?")
                    .bind(op_id.to_string())
                    .execute(self.pool())
                    .await?;
            }
        }
        Ok(())
    }

    /// Counts of (pending, terminally failed) operations.
    pub(crate) async fn queue_counts(&self) -> Result<(usize, usize)> {
        let pending: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_queue WHERE failed = 0")
            .fetch_one(self.pool())
            .await?;
        let failed: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_queue WHERE failed = 1")
            .fetch_one(self.pool())
            .await?;
        Ok((pending.0 as usize, failed.0 as usize))
    }

    /// Operations in the terminal failed sub-state, FIFO.
    pub(crate) async fn queue_failed_ops(&self) -> Result<Vec<PendingOperation>> {
        let rows = sqlx::query(
            "SELECT * FROM pending_queue WHERE failed = 1
             ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(op_from_row).collect()
    }

    /// Return terminally failed operations to the live queue.
    pub(crate) async fn queue_reset_failed(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE pending_queue SET failed = 0, attempts = 0, last_attempt = NULL
             WHERE failed = 1",
        )
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Drop terminally failed operations.
    pub(crate) async fn queue_discard_failed(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pending_queue WHERE failed = 1")
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Total queue depth, failed rows included.
    pub(crate) async fn queue_total_len(&self) -> Result<usize> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_queue")
            .fetch_one(self.pool())
            .await?;
        Ok(row.0 as usize)
    }
}

fn op_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PendingOperation> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| StoreError::serialization(format!("bad operation id '{}': {}", id, e)))?;

    let kind: String = row.try_get("kind")?;
    let kind = OperationKind::parse(&kind)
        .ok_or_else(|| StoreError::serialization(format!("unknown operation kind '{}'", kind)))?;

    let payload: String = row.try_get("payload")?;
    let last_modified: String = row.try_get("last_modified")?;
    let deleted: i64 = row.try_get("deleted")?;
    let created_at: String = row.try_get("created_at")?;
    let last_attempt: Option<String> = row.try_get("last_attempt")?;
    let attempts: i64 = row.try_get("attempts")?;
    let failed: i64 = row.try_get("failed")?;

    Ok(PendingOperation {
        id,
        collection: row.try_get("collection")?,
        kind,
        entity: Entity {
            id: row.try_get("entity_id")?,
            payload: serde_json::from_str(&payload)?,
            last_modified: parse_ts(&last_modified)?,
            deleted: deleted != 0,
        },
        created_at: parse_ts(&created_at)?,
        attempts: attempts as u32,
        last_attempt: last_attempt.as_deref().map(parse_ts).transpose()?,
        last_error: row.try_get("last_error")?,
        failed: failed != 0,
    })
}

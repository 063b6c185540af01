//! # Local Persistent Store
//!
//! SQLite-backed persistence for the synchronization engine. Holds the
//! authoritative copy of every entity collection while offline, the persisted
//! pending-operation queue, and reserved sync metadata.
//!
//! ## Architecture
//!
//! One database file (WAL mode) with three tables, see `schema.sql`:
//! - **entities**: one row per record, keyed by `(collection, id)`; deletions
//!   are kept as tombstones so they propagate and win timestamp comparisons
//!   against stale remote updates
//! - **pending_queue**: the serialized Pending-Operation Queue, so a restart
//!   does not lose unsynced work (row-level access lives in `queue.rs`)
//! - **sync_meta**: reserved keys such as the last-successful-sync timestamp
//!
//! The store itself never touches the queue on entity writes; the auto-sync
//! manager owns that pairing through its mutation entry points.

pub mod queue;

use crate::error::StoreError;
use crate::model::{meta_keys, Entity};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// Result type for local store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of an entity upsert, used to pick the queued operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// No live row existed for this id
    Created,
    /// An existing live row was replaced
    Updated,
}

/// SQLite-backed local store.
#[derive(Debug)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    /// Open or create the store at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::init(pool).await
    }

    /// Open the store at the platform default location
    /// (`<data_dir>/ledgersync/local.db`).
    pub async fn open_default() -> Result<Self> {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("ledgersync");
        path.push("local.db");
        Self::open(path).await
    }

    /// Open an in-memory store, used by tests and ephemeral sessions.
    pub async fn open_in_memory() -> Result<Self> {
        let options: SqliteConnectOptions =
            "sqlite::memory:".parse().map_err(StoreError::from)?;
        // a single never-recycled connection keeps every caller on the same
        // in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        sqlx::raw_sql(include_str!("schema.sql")).execute(&pool).await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Apply any pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current: (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        if current.0 < 1 {
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (1, ?)")
                .bind(fmt_ts(Utc::now()))
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// All live entities in a collection, tombstones excluded.
    pub async fn get(&self, collection: &str) -> Result<Vec<Entity>> {
        let rows = sqlx::query(
            "SELECT id, payload, last_modified, deleted FROM entities
             WHERE collection = ? AND deleted = 0
             ORDER BY id ASC",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entity_from_row).collect()
    }

    /// A single entity by id, tombstones included.
    pub async fn get_entity(&self, collection: &str, id: &str) -> Result<Option<Entity>> {
        let row = sqlx::query(
            "SELECT id, payload, last_modified, deleted FROM entities
             WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entity_from_row).transpose()
    }

    /// Upsert a locally-mutated entity.
    ///
    /// Returns whether a live row existed, so the caller can queue the right
    /// operation kind. Recreating over a tombstone counts as `Created`.
    pub async fn put(&self, collection: &str, entity: &Entity) -> Result<PutOutcome> {
        let existing = self.get_entity(collection, &entity.id).await?;
        let outcome = match existing {
            Some(e) if !e.deleted => PutOutcome::Updated,
            _ => PutOutcome::Created,
        };
        self.apply_remote(collection, entity).await?;
        Ok(outcome)
    }

    /// Write an entity without any queue side effects, used for merging
    /// remote-originated changes and for local upserts via `put`.
    pub async fn apply_remote(&self, collection: &str, entity: &Entity) -> Result<()> {
        let payload = serde_json::to_string(&entity.payload)?;
        sqlx::query(
            "INSERT OR REPLACE INTO entities (collection, id, payload, last_modified, deleted)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(collection)
        .bind(&entity.id)
        .bind(payload)
        .bind(fmt_ts(entity.last_modified))
        .bind(entity.deleted as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Soft-delete an entity, leaving a tombstone with a bumped timestamp.
    ///
    /// Returns the tombstone, or `None` if there was no live row to delete.
    pub async fn delete(&self, collection: &str, id: &str) -> Result<Option<Entity>> {
        match self.get_entity(collection, id).await? {
            Some(e) if !e.deleted => {}
            _ => return Ok(None),
        }
        let tombstone = Entity::tombstone(id, Utc::now());
        self.apply_remote(collection, &tombstone).await?;
        Ok(Some(tombstone))
    }

    /// Set a reserved metadata value.
    pub async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_meta (key, value, updated_at) VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(fmt_ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a reserved metadata value.
    pub async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM sync_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    /// Timestamp of the last fully successful flush, if any.
    pub async fn last_successful_sync(&self) -> Result<Option<DateTime<Utc>>> {
        match self.get_meta(meta_keys::LAST_SUCCESSFUL_SYNC).await? {
            Some(value) => Ok(Some(parse_ts(&value)?)),
            None => Ok(None),
        }
    }

    /// Record a fully successful flush.
    pub async fn set_last_successful_sync(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_meta(meta_keys::LAST_SUCCESSFUL_SYNC, &fmt_ts(at)).await
    }

    /// Basic statistics for debugging surfaces.
    pub async fn stats(&self) -> Result<StoreStats> {
        let live: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities WHERE deleted = 0")
            .fetch_one(&self.pool)
            .await?;
        let tombstones: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities WHERE deleted = 1")
            .fetch_one(&self.pool)
            .await?;
        let pending: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_queue WHERE failed = 0")
            .fetch_one(&self.pool)
            .await?;
        let failed: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_queue WHERE failed = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            live_entities: live.0 as u64,
            tombstones: tombstones.0 as u64,
            pending_operations: pending.0 as u64,
            failed_operations: failed.0 as u64,
        })
    }
}

/// Store statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Entities currently visible to the application
    pub live_entities: u64,
    /// Soft-deleted entities retained for deletion propagation
    pub tombstones: u64,
    /// Queued operations awaiting sync
    pub pending_operations: u64,
    /// Operations in the terminal failed sub-state
    pub failed_operations: u64,
}

fn entity_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Entity> {
    let payload: String = row.try_get("payload")?;
    let last_modified: String = row.try_get("last_modified")?;
    let deleted: i64 = row.try_get("deleted")?;
    Ok(Entity {
        id: row.try_get("id")?,
        payload: serde_json::from_str(&payload)?,
        last_modified: parse_ts(&last_modified)?,
        deleted: deleted != 0,
    })
}

/// Fixed-width RFC 3339 formatting so stored timestamps sort lexicographically.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::serialization(format!("bad timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::collections;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let entity = Entity::new("e1", serde_json::json!({"amount": 12.5}));

        let outcome = store.put(collections::EXPENSES, &entity).await.unwrap();
        assert_eq!(outcome, PutOutcome::Created);

        let all = store.get(collections::EXPENSES).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], entity);

        // same id again is an update
        let outcome = store.put(collections::EXPENSES, &entity).await.unwrap();
        assert_eq!(outcome, PutOutcome::Updated);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let entity = Entity::new("e1", serde_json::json!({}));
        store.put(collections::EXPENSES, &entity).await.unwrap();

        assert!(store.get(collections::CATEGORIES).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_leaves_tombstone() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let entity = Entity::new("e1", serde_json::json!({"amount": 1}));
        store.put(collections::EXPENSES, &entity).await.unwrap();

        let tombstone = store.delete(collections::EXPENSES, "e1").await.unwrap();
        assert!(tombstone.is_some());

        // gone from the live view, still visible by id
        assert!(store.get(collections::EXPENSES).await.unwrap().is_empty());
        let by_id = store.get_entity(collections::EXPENSES, "e1").await.unwrap().unwrap();
        assert!(by_id.deleted);
        assert!(by_id.last_modified >= entity.last_modified);
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let tombstone = store.delete(collections::EXPENSES, "ghost").await.unwrap();
        assert!(tombstone.is_none());
    }

    #[tokio::test]
    async fn test_recreate_over_tombstone_counts_as_create() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let entity = Entity::new("e1", serde_json::json!({"amount": 1}));
        store.put(collections::EXPENSES, &entity).await.unwrap();
        store.delete(collections::EXPENSES, "e1").await.unwrap();

        let revived = Entity::new("e1", serde_json::json!({"amount": 2}));
        let outcome = store.put(collections::EXPENSES, &revived).await.unwrap();
        assert_eq!(outcome, PutOutcome::Created);
        assert_eq!(store.get(collections::EXPENSES).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_meta_roundtrip() {
        let store = LocalStore::open_in_memory().await.unwrap();
        assert!(store.last_successful_sync().await.unwrap().is_none());

        let at = Utc::now();
        store.set_last_successful_sync(at).await.unwrap();
        let read = store.last_successful_sync().await.unwrap().unwrap();
        // microsecond precision survives the round trip
        assert_eq!(fmt_ts(read), fmt_ts(at));

        assert!(store.get_meta("unknown-key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store
            .put(collections::EXPENSES, &Entity::new("e1", serde_json::json!({})))
            .await
            .unwrap();
        store
            .put(collections::EXPENSES, &Entity::new("e2", serde_json::json!({})))
            .await
            .unwrap();
        store.delete(collections::EXPENSES, "e2").await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.live_entities, 1);
        assert_eq!(stats.tombstones, 1);
        assert_eq!(stats.pending_operations, 0);
    }
}

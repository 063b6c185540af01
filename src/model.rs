//! Core Data Model
//!
//! Types shared by every layer of the synchronization engine:
//!
//! - `Entity` - a synchronized domain record (expense, category, account, theme)
//! - `PendingOperation` - a queued local mutation awaiting confirmation
//! - `RemoteChange` - a remote-originated change event
//! - `SyncStatus` - the derived read model consumed by UI indicators
//!
//! All timestamps are `chrono::DateTime<Utc>` and are stored as RFC 3339
//! strings. Operation ids are v4 UUIDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known collection names in the local persistence namespace.
///
/// The store accepts arbitrary collection names; these are the ones the
/// expense tracker itself uses.
pub mod collections {
    /// Expense records
    pub const EXPENSES: &str = "expenses";
    /// Expense categories
    pub const CATEGORIES: &str = "categories";
    /// Payment accounts
    pub const ACCOUNTS: &str = "accounts";
    /// Active theme document
    pub const APP_THEME: &str = "app-theme";

    /// The default set of synchronized collections.
    pub fn default_set() -> Vec<String> {
        vec![
            EXPENSES.to_string(),
            CATEGORIES.to_string(),
            ACCOUNTS.to_string(),
            APP_THEME.to_string(),
        ]
    }
}

/// Reserved keys in the sync metadata table.
pub mod meta_keys {
    /// Timestamp of the last fully successful flush
    pub const LAST_SUCCESSFUL_SYNC: &str = "last-successful-sync";
}

/// A synchronized domain record.
///
/// The payload is free-form JSON; the engine only interprets the identifier,
/// the modification timestamp (for last-writer-wins) and the soft-delete
/// flag. Deleted entities are kept as tombstones so that deletion propagates
/// and stale remote updates lose the timestamp comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Opaque identifier, unique within its collection
    pub id: String,
    /// The record fields
    pub payload: serde_json::Value,
    /// Timestamp of the last mutation, local or remote
    pub last_modified: DateTime<Utc>,
    /// Soft-delete flag; deleted entities are tombstones
    pub deleted: bool,
}

impl Entity {
    /// Create a live entity stamped with the current time.
    pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            payload,
            last_modified: Utc::now(),
            deleted: false,
        }
    }

    /// Create a tombstone for a deleted entity.
    pub fn tombstone(id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            payload: serde_json::Value::Null,
            last_modified: at,
            deleted: true,
        }
    }

    /// Whether this copy wins a last-writer-wins comparison against `other`.
    pub fn is_newer_than(&self, other: &Entity) -> bool {
        self.last_modified > other.last_modified
    }
}

/// The kind of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// A new entity
    Create,
    /// A changed entity
    Update,
    /// A soft deletion
    Delete,
}

impl OperationKind {
    /// Stable name used in the persisted queue.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Parse a persisted kind name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A local mutation not yet confirmed against the remote store.
///
/// Operations are persisted in the local store so a restart does not lose
/// unsynced work, and carry the retry bookkeeping the backoff policy needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Operation id, distinct from the entity id
    pub id: Uuid,
    /// Collection the entity belongs to
    pub collection: String,
    /// Mutation kind
    pub kind: OperationKind,
    /// The entity as mutated locally; a tombstone for deletions
    pub entity: Entity,
    /// When the operation was enqueued
    pub created_at: DateTime<Utc>,
    /// Number of failed push attempts so far
    pub attempts: u32,
    /// When the last push attempt was made
    pub last_attempt: Option<DateTime<Utc>>,
    /// Error message from the last failed attempt
    pub last_error: Option<String>,
    /// Terminal sub-state: excluded from automatic retry, visible in
    /// `SyncStatus::failed_count` until manually retried or discarded
    pub failed: bool,
}

impl PendingOperation {
    /// Create a fresh operation for an entity mutation.
    pub fn new(collection: impl Into<String>, kind: OperationKind, entity: Entity) -> Self {
        Self {
            id: Uuid::new_v4(),
            collection: collection.into(),
            kind,
            entity,
            created_at: Utc::now(),
            attempts: 0,
            last_attempt: None,
            last_error: None,
            failed: false,
        }
    }

    /// Identifier of the entity this operation mutates.
    pub fn entity_id(&self) -> &str {
        &self.entity.id
    }
}

/// A remote-originated entity change.
///
/// Delivery is at-least-once; consumers must merge idempotently. A deletion
/// arrives as an entity with `deleted == true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteChange {
    /// Collection the entity belongs to
    pub collection: String,
    /// The entity as the backend now stores it
    pub entity: Entity,
}

/// Derived synchronization status, consumed by UI indicators only.
///
/// Recomputed on every queue mutation, connectivity change and flush
/// completion; never drives business logic.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    /// Host-reported network availability
    pub is_online: bool,
    /// Result of the last backend reachability probe
    pub is_backend_reachable: bool,
    /// Operations queued for automatic sync
    pub pending_count: usize,
    /// Operations in the terminal failed sub-state
    pub failed_count: usize,
    /// When a flush last completed with every operation acknowledged
    pub last_successful_sync: Option<DateTime<Utc>>,
    /// Whether a flush cycle is currently in flight
    pub is_syncing: bool,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            is_online: true,
            is_backend_reachable: true,
            pending_count: 0,
            failed_count: 0,
            last_successful_sync: None,
            is_syncing: false,
        }
    }
}

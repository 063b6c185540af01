//! # Remote Sync Client
//!
//! The seam between the sync engine and the backend. The auto-sync manager
//! only ever talks to the [`RemoteClient`] trait, so the backend can be the
//! bundled HTTP implementation, or an in-process fake in tests.
//!
//! ## Contract
//!
//! - `push` is idempotent per entity id: a repeated Create for an existing id
//!   behaves as an Update, a repeated Delete for an absent id is a no-op
//! - `pull` returns every entity changed since the cursor, tombstones
//!   included, so deletions propagate on reconciliation
//! - `subscribe_changes` delivers remote-originated changes at-least-once;
//!   consumers must merge idempotently
//! - errors are classified per the engine's failure taxonomy (see
//!   [`crate::error::SyncError`]) so the manager can retry, resolve, pause,
//!   or reject accordingly

pub mod http;

use crate::error::SyncError;
use crate::model::{Entity, PendingOperation, RemoteChange};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

pub use http::{HttpRemoteClient, HttpRemoteConfig};

/// Backend client used by the auto-sync manager.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Apply one queued operation against the remote store.
    ///
    /// Fails with `SyncError::Conflict` when the remote copy is newer than
    /// the base the operation was made from.
    async fn push(&self, op: &PendingOperation) -> Result<(), SyncError>;

    /// Apply one queued operation unconditionally, used after
    /// last-writer-wins resolved a conflict in the local direction.
    async fn overwrite(&self, op: &PendingOperation) -> Result<(), SyncError>;

    /// Fetch entities changed since the cursor (all of them when `None`),
    /// tombstones included.
    async fn pull(
        &self,
        collection: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Entity>, SyncError>;

    /// Subscribe to remote-originated changes. Delivery is at-least-once.
    fn subscribe_changes(&self) -> broadcast::Receiver<RemoteChange>;

    /// Lightweight reachability check.
    async fn probe(&self) -> Result<(), SyncError>;
}

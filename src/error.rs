//! Error Types
//!
//! Defines the failure taxonomy for the synchronization engine, split along
//! the local/remote boundary:
//!
//! - `StoreError` - failures of the local persistent store (SQLite)
//! - `SyncError` - failures of remote synchronization attempts
//!
//! # Error Categories
//!
//! Remote failures are classified so the auto-sync manager can decide what to
//! do with a queued operation:
//!
//! - `Network` - transient; the operation stays queued and is retried with backoff
//! - `Conflict` - the remote copy changed; resolved by last-writer-wins on `last_modified`
//! - `Auth` - fatal for the session; sync pauses until re-authentication
//! - `Validation` - the backend rejected the operation; never retried automatically
//!
//! Transient errors are absorbed inside the manager and surface only through
//! the `SyncStatus` read model, never as panics in a caller's event path.

use crate::model::Entity;
use thiserror::Error;

/// Failures of the local persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying storage is full; the write was rejected and the caller
    /// must roll back the mutation instead of enqueuing it for sync.
    #[error("local storage quota exceeded")]
    QuotaExceeded,

    /// Any other database-level failure.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// A stored payload or queue row could not be (de)serialized.
    #[error("serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },
}

impl StoreError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        // SQLITE_FULL (13) is the storage-quota case and gets its own variant
        // so callers can roll back instead of retrying.
        if let sqlx::Error::Database(ref db) = err {
            let full_code = db.code().map(|c| c == "13").unwrap_or(false);
            if full_code || db.message().contains("database or disk is full") {
                return Self::QuotaExceeded;
            }
        }
        Self::Database(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

/// Failures of remote synchronization attempts.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transient transport-level failure; the operation remains queued.
    #[error("network error: {message}")]
    Network {
        /// Human-readable error message
        message: String,
    },

    /// The remote copy of the entity changed since it was last known locally.
    /// Carries the current remote copy so the caller can resolve by
    /// last-writer-wins on `last_modified`.
    #[error("conflict on entity '{}'", .remote.id)]
    Conflict {
        /// The entity as the backend currently stores it
        remote: Box<Entity>,
    },

    /// The session is no longer authenticated; sync pauses until the
    /// application signals re-authentication.
    #[error("authentication required: {message}")]
    Auth {
        /// Human-readable error message
        message: String,
    },

    /// The backend rejected the operation as invalid; it is dequeued and
    /// surfaced rather than retried indefinitely.
    #[error("operation rejected by backend: {message}")]
    Validation {
        /// Human-readable error message
        message: String,
    },

    /// A local store failure observed while syncing.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Create a new network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new conflict error carrying the current remote copy
    pub fn conflict(remote: Entity) -> Self {
        Self::Conflict {
            remote: Box::new(remote),
        }
    }

    /// Create a new authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether this failure should leave the operation queued for retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_is_transient() {
        let error = SyncError::network("connection refused");
        assert!(error.is_transient());
    }

    #[test]
    fn test_terminal_errors_are_not_transient() {
        assert!(!SyncError::auth("token expired").is_transient());
        assert!(!SyncError::validation("amount must be positive").is_transient());
    }

    #[test]
    fn test_conflict_carries_remote_copy() {
        let remote = Entity::new("e1", serde_json::json!({"amount": 75}));
        let error = SyncError::conflict(remote);
        match error {
            SyncError::Conflict { remote } => assert_eq!(remote.id, "e1"),
            _ => panic!("Expected Conflict"),
        }
    }

    #[test]
    fn test_error_display() {
        let error = SyncError::auth("token expired");
        let display = format!("{}", error);
        assert!(display.contains("authentication required"));
        assert!(display.contains("token expired"));
    }

    #[test]
    fn test_from_serde_error() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("{ invalid json }");
        let store_error: StoreError = result.unwrap_err().into();
        match store_error {
            StoreError::Serialization { .. } => {}
            _ => panic!("Expected Serialization error from serde error"),
        }
    }
}

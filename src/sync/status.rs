//! Sync status publishing
//!
//! The `SyncStatus` read model is recomputed by the auto-sync manager and
//! published over a watch channel so any UI layer, reactive or imperative,
//! can observe it. Unsubscribing is dropping the receiver.

use crate::model::SyncStatus;
use tokio::sync::watch;

/// Watch-channel publisher for the derived sync status.
#[derive(Debug)]
pub struct StatusPublisher {
    tx: watch::Sender<SyncStatus>,
}

impl StatusPublisher {
    /// Create a publisher with an initial status.
    pub fn new(initial: SyncStatus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// The latest published status.
    pub fn current(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    /// Subscribe to status updates.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    /// Publish a recomputed status; unchanged values are not re-broadcast.
    pub fn publish(&self, status: SyncStatus) {
        self.tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}

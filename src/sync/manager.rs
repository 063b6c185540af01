//! # Auto-Sync Manager
//!
//! The orchestrator tying the local store, pending queue, connectivity
//! monitor and remote client together. Explicitly constructed with injected
//! collaborators; lifecycle belongs to the application's root composition.
//!
//! ## State machine
//!
//! `Idle`, `Flushing`, `Paused` (authentication failure), `Offline`.
//!
//! A flush is triggered by: the queue becoming non-empty while online and
//! reachable, the periodic timer while operations are pending, an explicit
//! `force_sync` call, or connectivity coming back. At most one flush cycle is
//! ever in flight; a trigger that arrives while one is running observes it
//! and does nothing — it never queues a second cycle.
//!
//! ## Flush discipline
//!
//! The batch is taken at cycle start and processed sequentially, one network
//! round-trip at a time, to keep per-collection FIFO ordering deterministic.
//! Losing connectivity mid-flush leaves the in-flight operation queued: its
//! outcome is unknown and it is treated as failed-retryable, never assumed
//! applied. Conflicts resolve by last-writer-wins on `last_modified`.

use crate::config::SyncConfig;
use crate::error::{StoreError, SyncError};
use crate::model::{Entity, OperationKind, PendingOperation, RemoteChange, SyncStatus};
use crate::offline::PendingQueue;
use crate::remote::RemoteClient;
use crate::store::{LocalStore, PutOutcome};
use crate::sync::connectivity::{Connectivity, ConnectivityMonitor};
use crate::sync::metrics::SyncMetrics;
use crate::sync::status::StatusPublisher;
use chrono::Utc;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, Notify, RwLock};

/// Manager lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Nothing to do, or waiting for the next trigger
    Idle,
    /// A flush cycle is in flight
    Flushing,
    /// Authentication failed; waiting for the re-auth signal
    Paused,
    /// Connectivity is down; waiting for it to return
    Offline,
}

/// Outcome of pushing a single operation.
enum PushOutcome {
    Acked,
    Retry,
    Rejected,
    AuthFailed(String),
}

/// How a flush batch ended.
enum CycleEnd {
    Completed { clean: bool },
    WentOffline,
    AuthFailed(String),
}

/// Orchestrates offline-first synchronization.
pub struct AutoSyncManager {
    config: SyncConfig,
    store: Arc<LocalStore>,
    queue: PendingQueue,
    remote: Arc<dyn RemoteClient>,
    connectivity: Arc<ConnectivityMonitor>,
    state: RwLock<ManagerState>,
    status: StatusPublisher,
    flush_gate: Mutex<()>,
    flush_kick: Notify,
    metrics: RwLock<SyncMetrics>,
    tasks: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl AutoSyncManager {
    /// Compose a manager from its collaborators.
    pub async fn new(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteClient>,
        connectivity: Arc<ConnectivityMonitor>,
        config: SyncConfig,
    ) -> Result<Arc<Self>, StoreError> {
        let queue = PendingQueue::new(
            Arc::clone(&store),
            config.backoff(),
            config.max_attempts,
            config.queue_high_water,
        );
        let conn = connectivity.current();
        let initial = SyncStatus {
            is_online: conn.is_online,
            is_backend_reachable: conn.is_backend_reachable,
            pending_count: queue.count_pending().await?,
            failed_count: queue.count_failed().await?,
            last_successful_sync: store.last_successful_sync().await?,
            is_syncing: false,
        };
        Ok(Arc::new(Self {
            config,
            store,
            queue,
            remote,
            connectivity,
            state: RwLock::new(ManagerState::Idle),
            status: StatusPublisher::new(initial),
            flush_gate: Mutex::new(()),
            flush_kick: Notify::new(),
            metrics: RwLock::new(SyncMetrics::new()),
            tasks: std::sync::Mutex::new(Vec::new()),
        }))
    }

    /// Start the background loop and the reachability probe. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.is_empty() {
            return;
        }
        self.connectivity.start(Arc::clone(&self.remote));
        let manager = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            manager.run_loop().await;
        }));
        tracing::info!("auto-sync started");
    }

    /// Stop background work. The queue and store are left intact.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        self.connectivity.stop();
        tracing::info!("auto-sync stopped");
    }

    // ---- data layer -------------------------------------------------------

    /// All live entities in a collection.
    pub async fn get(&self, collection: &str) -> Result<Vec<Entity>, StoreError> {
        self.store.get(collection).await
    }

    /// Write an entity locally and queue it for sync.
    ///
    /// The store write happens first; if it fails (e.g. quota exceeded) the
    /// error propagates and nothing is queued, so the mutation can be rolled
    /// back by the caller.
    pub async fn put(&self, collection: &str, entity: Entity) -> Result<(), StoreError> {
        let outcome = self.store.put(collection, &entity).await?;
        let kind = match outcome {
            PutOutcome::Created => OperationKind::Create,
            PutOutcome::Updated => OperationKind::Update,
        };
        self.queue
            .enqueue(PendingOperation::new(collection, kind, entity))
            .await?;
        self.publish_status().await;
        self.flush_kick.notify_one();
        Ok(())
    }

    /// Soft-delete an entity locally and queue the deletion for sync.
    /// Deleting an absent entity is a no-op.
    pub async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let Some(tombstone) = self.store.delete(collection, id).await? else {
            return Ok(());
        };
        self.queue
            .enqueue(PendingOperation::new(
                collection,
                OperationKind::Delete,
                tombstone,
            ))
            .await?;
        self.publish_status().await;
        self.flush_kick.notify_one();
        Ok(())
    }

    // ---- status surface ---------------------------------------------------

    /// The latest derived status.
    pub fn status(&self) -> SyncStatus {
        self.status.current()
    }

    /// Subscribe to status changes; unsubscribing is dropping the receiver.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Snapshot of the sync metrics.
    pub async fn metrics(&self) -> SyncMetrics {
        self.metrics.read().await.clone()
    }

    /// Terminally failed operations with their last error messages, for
    /// "needs attention" surfaces.
    pub async fn failed_operations(&self) -> Result<Vec<PendingOperation>, StoreError> {
        self.queue.failed_operations().await
    }

    // ---- sync entry points ------------------------------------------------

    /// Flush the queue now, then pull remote changes since the last
    /// successful sync.
    ///
    /// Coalesced to a no-op observation if a flush is already in flight.
    /// Returns an error only for authentication failures and internal store
    /// failures; transient network trouble is absorbed into the status.
    pub async fn force_sync(&self) -> Result<(), SyncError> {
        if *self.state.read().await == ManagerState::Paused {
            return Err(SyncError::auth("sync is paused until re-authentication"));
        }
        if !self.connectivity.current().is_ok() {
            tracing::debug!("force sync requested while unreachable; queue kept for later");
            return Ok(());
        }
        let Ok(_guard) = self.flush_gate.try_lock() else {
            tracing::debug!("flush already in flight; force sync coalesced");
            return Ok(());
        };
        self.flush_cycle().await?;
        self.reconcile().await
    }

    /// Initial full pull of every configured collection, merged through the
    /// same last-writer-wins rules as live change events. Returns how many
    /// entities were applied locally.
    pub async fn hydrate(&self) -> Result<usize, SyncError> {
        let pulls = self.config.collections.iter().map(|collection| {
            let remote = Arc::clone(&self.remote);
            let collection = collection.clone();
            async move {
                let result = remote.pull(&collection, None).await;
                (collection, result)
            }
        });

        let mut applied = 0;
        for (collection, result) in join_all(pulls).await {
            match result {
                Ok(entities) => {
                    for entity in entities {
                        let change = RemoteChange {
                            collection: collection.clone(),
                            entity,
                        };
                        if self.merge_remote(change).await? {
                            applied += 1;
                        }
                    }
                }
                Err(SyncError::Auth { message }) => {
                    self.pause(&message).await;
                    return Err(SyncError::auth(message));
                }
                Err(e) => {
                    tracing::warn!(collection = %collection, error = %e, "hydration pull failed");
                }
            }
        }
        Ok(applied)
    }

    /// Signal from the authentication collaborator that the session is valid
    /// again; resumes a paused manager.
    pub async fn notify_reauthenticated(&self) {
        {
            let mut state = self.state.write().await;
            if *state != ManagerState::Paused {
                return;
            }
            *state = ManagerState::Idle;
        }
        tracing::info!("re-authentication signalled; resuming sync");
        self.publish_status().await;
        self.flush_kick.notify_one();
    }

    /// Return every terminally failed operation to the live queue and
    /// schedule a flush.
    pub async fn retry_failed(&self) -> Result<u64, StoreError> {
        let restored = self.queue.retry_failed().await?;
        if restored > 0 {
            tracing::info!(restored, "failed operations returned to the queue");
            self.publish_status().await;
            self.flush_kick.notify_one();
        }
        Ok(restored)
    }

    /// Drop every terminally failed operation.
    pub async fn discard_failed(&self) -> Result<u64, StoreError> {
        let dropped = self.queue.discard_failed().await?;
        if dropped > 0 {
            tracing::info!(dropped, "failed operations discarded");
            self.publish_status().await;
        }
        Ok(dropped)
    }

    // ---- background loop --------------------------------------------------

    async fn run_loop(self: Arc<Self>) {
        let mut connectivity_rx = self.connectivity.subscribe();
        let mut changes_rx = self.remote.subscribe_changes();
        let mut changes_open = true;
        let mut timer = tokio::time::interval(self.config.flush_interval());
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let pending = match self.queue.count_pending().await {
                        Ok(n) => n,
                        Err(e) => {
                            tracing::error!(error = %e, "cannot read queue depth");
                            0
                        }
                    };
                    if pending > 0 {
                        self.try_flush().await;
                    }
                }
                _ = self.flush_kick.notified() => {
                    self.try_flush().await;
                }
                changed = connectivity_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let connectivity = connectivity_rx.borrow_and_update().clone();
                    self.on_connectivity_change(connectivity).await;
                }
                received = changes_rx.recv(), if changes_open => {
                    match received {
                        Ok(change) => {
                            if let Err(e) = self.merge_remote(change).await {
                                tracing::error!(error = %e, "failed to merge remote change");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "change feed lagged; the next reconciliation pull will catch up");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            changes_open = false;
                        }
                    }
                }
            }
        }
    }

    async fn on_connectivity_change(&self, connectivity: Connectivity) {
        tracing::info!(
            online = connectivity.is_online,
            reachable = connectivity.is_backend_reachable,
            "connectivity changed"
        );
        if connectivity.is_ok() {
            {
                let mut state = self.state.write().await;
                if *state == ManagerState::Offline {
                    *state = ManagerState::Idle;
                }
            }
            self.publish_status().await;
            self.try_flush().await;
        } else {
            {
                let mut state = self.state.write().await;
                // a flush in flight notices the loss itself; Paused stays paused
                if !matches!(*state, ManagerState::Paused | ManagerState::Flushing) {
                    *state = ManagerState::Offline;
                }
            }
            self.publish_status().await;
        }
    }

    async fn try_flush(&self) {
        if !self.connectivity.current().is_ok() {
            return;
        }
        if *self.state.read().await == ManagerState::Paused {
            return;
        }
        let Ok(_guard) = self.flush_gate.try_lock() else {
            return;
        };
        if let Err(e) = self.flush_cycle().await {
            tracing::warn!(error = %e, "flush cycle ended with error");
        }
    }

    /// One flush cycle. Caller must hold `flush_gate`.
    async fn flush_cycle(&self) -> Result<(), SyncError> {
        {
            let mut state = self.state.write().await;
            if *state == ManagerState::Paused {
                return Err(SyncError::auth("sync is paused until re-authentication"));
            }
            *state = ManagerState::Flushing;
        }
        self.publish_status().await;
        self.metrics.write().await.record_cycle_start();

        match self.flush_batch().await {
            Ok(CycleEnd::Completed { clean }) => {
                if clean {
                    if let Err(e) = self.store.set_last_successful_sync(Utc::now()).await {
                        tracing::error!(error = %e, "cannot record last successful sync");
                    }
                    self.metrics.write().await.record_cycle_success();
                } else {
                    self.metrics.write().await.record_cycle_failure();
                }
                self.finish_cycle().await;
                tracing::debug!(clean, "flush cycle finished");
                Ok(())
            }
            Ok(CycleEnd::WentOffline) => {
                self.metrics.write().await.record_cycle_failure();
                *self.state.write().await = ManagerState::Offline;
                self.publish_status().await;
                Ok(())
            }
            Ok(CycleEnd::AuthFailed(message)) => {
                self.metrics.write().await.record_cycle_failure();
                self.pause(&message).await;
                Err(SyncError::auth(message))
            }
            Err(e) => {
                // local store trouble; end the cycle so the state machine
                // does not report a flush that is no longer running
                self.metrics.write().await.record_cycle_failure();
                self.finish_cycle().await;
                Err(e)
            }
        }
    }

    /// Push the batch taken at cycle start, sequentially.
    async fn flush_batch(&self) -> Result<CycleEnd, SyncError> {
        let batch = self
            .queue
            .peek_batch(self.config.flush_batch_size, Utc::now())
            .await
            .map_err(SyncError::from)?;
        tracing::debug!(operations = batch.len(), "flush cycle started");

        let mut clean = true;
        for op in batch {
            if !self.connectivity.current().is_ok() {
                tracing::warn!("connectivity lost mid-flush; leaving remaining operations queued");
                return Ok(CycleEnd::WentOffline);
            }
            match self.push_operation(&op).await? {
                PushOutcome::Acked | PushOutcome::Rejected => {}
                PushOutcome::Retry => clean = false,
                PushOutcome::AuthFailed(message) => {
                    return Ok(CycleEnd::AuthFailed(message));
                }
            }
            self.publish_status().await;
        }
        Ok(CycleEnd::Completed { clean })
    }

    /// Leave `Flushing` for whatever connectivity currently warrants.
    async fn finish_cycle(&self) {
        {
            let mut state = self.state.write().await;
            if *state == ManagerState::Flushing {
                *state = if self.connectivity.current().is_ok() {
                    ManagerState::Idle
                } else {
                    ManagerState::Offline
                };
            }
        }
        self.publish_status().await;
    }

    async fn push_operation(&self, op: &PendingOperation) -> Result<PushOutcome, SyncError> {
        match self.remote.push(op).await {
            Ok(()) => {
                self.queue.acknowledge(&[op.id]).await.map_err(SyncError::from)?;
                self.metrics.write().await.record_pushed();
                Ok(PushOutcome::Acked)
            }
            Err(SyncError::Conflict { remote }) => self.resolve_conflict(op, *remote).await,
            Err(SyncError::Auth { message }) => Ok(PushOutcome::AuthFailed(message)),
            Err(SyncError::Validation { message }) => {
                tracing::warn!(
                    operation = %op.id,
                    entity = %op.entity_id(),
                    error = %message,
                    "backend rejected operation; it will not be retried"
                );
                self.queue
                    .mark_rejected(op.id, &message)
                    .await
                    .map_err(SyncError::from)?;
                Ok(PushOutcome::Rejected)
            }
            Err(SyncError::Network { message }) => {
                tracing::debug!(operation = %op.id, error = %message, "push failed; retrying with backoff");
                self.queue
                    .mark_failed(op.id, &message)
                    .await
                    .map_err(SyncError::from)?;
                Ok(PushOutcome::Retry)
            }
            Err(SyncError::Store(e)) => Err(SyncError::Store(e)),
        }
    }

    /// Resolve a push conflict by last-writer-wins on `last_modified`.
    async fn resolve_conflict(
        &self,
        op: &PendingOperation,
        remote_entity: Entity,
    ) -> Result<PushOutcome, SyncError> {
        if remote_entity.is_newer_than(&op.entity) {
            tracing::info!(
                entity = %op.entity_id(),
                "remote copy is newer; keeping it and dropping the local write"
            );
            self.store
                .apply_remote(&op.collection, &remote_entity)
                .await
                .map_err(SyncError::from)?;
            self.queue.acknowledge(&[op.id]).await.map_err(SyncError::from)?;
            return Ok(PushOutcome::Acked);
        }

        tracing::info!(entity = %op.entity_id(), "local copy is newer; overwriting remote");
        match self.remote.overwrite(op).await {
            Ok(()) => {
                self.queue.acknowledge(&[op.id]).await.map_err(SyncError::from)?;
                self.metrics.write().await.record_pushed();
                Ok(PushOutcome::Acked)
            }
            Err(SyncError::Auth { message }) => Ok(PushOutcome::AuthFailed(message)),
            Err(SyncError::Validation { message }) => {
                self.queue
                    .mark_rejected(op.id, &message)
                    .await
                    .map_err(SyncError::from)?;
                Ok(PushOutcome::Rejected)
            }
            Err(SyncError::Store(e)) => Err(SyncError::Store(e)),
            // another writer raced us; back off and retry the comparison
            Err(e) => {
                self.queue
                    .mark_failed(op.id, &e.to_string())
                    .await
                    .map_err(SyncError::from)?;
                Ok(PushOutcome::Retry)
            }
        }
    }

    /// Pull remote changes since the last successful sync and merge them.
    async fn reconcile(&self) -> Result<(), SyncError> {
        let since = self.store.last_successful_sync().await.map_err(SyncError::from)?;
        for collection in &self.config.collections {
            match self.remote.pull(collection, since).await {
                Ok(entities) => {
                    for entity in entities {
                        let change = RemoteChange {
                            collection: collection.clone(),
                            entity,
                        };
                        self.merge_remote(change).await?;
                    }
                }
                Err(SyncError::Auth { message }) => {
                    self.pause(&message).await;
                    return Err(SyncError::auth(message));
                }
                Err(e) => {
                    tracing::warn!(collection = %collection, error = %e, "reconciliation pull failed");
                }
            }
        }
        Ok(())
    }

    /// Merge one remote-originated change into the local store.
    ///
    /// Idempotent under at-least-once delivery: a change that is not newer
    /// than the local store copy, or than a queued local edit, is skipped. A
    /// newer remote change supersedes queued local edits for that entity —
    /// flushing them afterwards would reorder writes the backend has already
    /// moved past.
    async fn merge_remote(&self, change: RemoteChange) -> Result<bool, SyncError> {
        let RemoteChange { collection, entity } = change;

        if let Some(pending) = self
            .queue
            .newest_pending_for(&collection, &entity.id)
            .await
            .map_err(SyncError::from)?
        {
            if pending >= entity.last_modified {
                tracing::debug!(
                    collection = %collection,
                    entity = %entity.id,
                    "remote change older than a queued local edit; skipping"
                );
                return Ok(false);
            }
            let dropped = self
                .queue
                .drop_superseded(&collection, &entity.id)
                .await
                .map_err(SyncError::from)?;
            tracing::info!(
                collection = %collection,
                entity = %entity.id,
                dropped,
                "remote change supersedes queued local edits"
            );
        }

        if let Some(local) = self
            .store
            .get_entity(&collection, &entity.id)
            .await
            .map_err(SyncError::from)?
        {
            if local.last_modified >= entity.last_modified {
                return Ok(false);
            }
        }

        self.store
            .apply_remote(&collection, &entity)
            .await
            .map_err(SyncError::from)?;
        self.publish_status().await;
        Ok(true)
    }

    async fn pause(&self, reason: &str) {
        tracing::warn!(reason, "authentication failure; pausing sync until re-authentication");
        *self.state.write().await = ManagerState::Paused;
        self.publish_status().await;
    }

    /// Recompute and publish the status read model.
    async fn publish_status(&self) {
        let previous = self.status.current();
        let connectivity = self.connectivity.current();
        let (pending_count, failed_count) =
            match tokio::try_join!(self.queue.count_pending(), self.queue.count_failed()) {
                Ok(counts) => counts,
                Err(e) => {
                    tracing::error!(error = %e, "cannot read queue counts for status");
                    (previous.pending_count, previous.failed_count)
                }
            };
        let last_successful_sync = match self.store.last_successful_sync().await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "cannot read last sync timestamp for status");
                previous.last_successful_sync
            }
        };
        let is_syncing = *self.state.read().await == ManagerState::Flushing;
        self.status.publish(SyncStatus {
            is_online: connectivity.is_online,
            is_backend_reachable: connectivity.is_backend_reachable,
            pending_count,
            failed_count,
            last_successful_sync,
            is_syncing,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::collections;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Remote that answers every call with a fixed behavior.
    struct ScriptedRemote {
        mode: std::sync::Mutex<Mode>,
        pushes: AtomicUsize,
        changes: broadcast::Sender<RemoteChange>,
    }

    #[derive(Clone, Copy)]
    enum Mode {
        Ok,
        Network,
        Auth,
    }

    impl ScriptedRemote {
        fn new(mode: Mode) -> Arc<Self> {
            let (changes, _) = broadcast::channel(16);
            Arc::new(Self {
                mode: std::sync::Mutex::new(mode),
                pushes: AtomicUsize::new(0),
                changes,
            })
        }

        fn set_mode(&self, mode: Mode) {
            *self.mode.lock().unwrap() = mode;
        }

        fn answer(&self) -> Result<(), SyncError> {
            match *self.mode.lock().unwrap() {
                Mode::Ok => Ok(()),
                Mode::Network => Err(SyncError::network("connection refused")),
                Mode::Auth => Err(SyncError::auth("token expired")),
            }
        }
    }

    #[async_trait]
    impl RemoteClient for ScriptedRemote {
        async fn push(&self, _op: &PendingOperation) -> Result<(), SyncError> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            self.answer()
        }
        async fn overwrite(&self, _op: &PendingOperation) -> Result<(), SyncError> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            self.answer()
        }
        async fn pull(
            &self,
            _collection: &str,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<Entity>, SyncError> {
            Ok(Vec::new())
        }
        fn subscribe_changes(&self) -> broadcast::Receiver<RemoteChange> {
            self.changes.subscribe()
        }
        async fn probe(&self) -> Result<(), SyncError> {
            self.answer()
        }
    }

    async fn manager_with(remote: Arc<ScriptedRemote>) -> Arc<AutoSyncManager> {
        let store = Arc::new(LocalStore::open_in_memory().await.unwrap());
        let connectivity = Arc::new(ConnectivityMonitor::new(std::time::Duration::from_secs(3600)));
        AutoSyncManager::new(
            store,
            remote as Arc<dyn RemoteClient>,
            connectivity,
            SyncConfig::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_queues_and_updates_status() {
        let remote = ScriptedRemote::new(Mode::Ok);
        let manager = manager_with(Arc::clone(&remote)).await;

        let entity = Entity::new("e1", serde_json::json!({"amount": 5}));
        manager.put(collections::EXPENSES, entity).await.unwrap();

        let status = manager.status();
        assert_eq!(status.pending_count, 1);
        assert!(!status.is_syncing);
    }

    #[tokio::test]
    async fn test_force_sync_drains_queue() {
        let remote = ScriptedRemote::new(Mode::Ok);
        let manager = manager_with(Arc::clone(&remote)).await;

        manager
            .put(collections::EXPENSES, Entity::new("e1", serde_json::json!({"amount": 5})))
            .await
            .unwrap();
        manager.force_sync().await.unwrap();

        let status = manager.status();
        assert_eq!(status.pending_count, 0);
        assert!(status.last_successful_sync.is_some());
        assert_eq!(remote.pushes.load(Ordering::SeqCst), 1);
        assert_eq!(manager.metrics().await.operations_pushed, 1);
    }

    #[tokio::test]
    async fn test_force_sync_while_unreachable_is_noop() {
        let remote = ScriptedRemote::new(Mode::Ok);
        let manager = manager_with(Arc::clone(&remote)).await;
        manager.connectivity.set_online(false);

        manager
            .put(collections::EXPENSES, Entity::new("e1", serde_json::json!({})))
            .await
            .unwrap();
        manager.force_sync().await.unwrap();

        assert_eq!(remote.pushes.load(Ordering::SeqCst), 0);
        assert_eq!(manager.status().pending_count, 1);
    }

    #[tokio::test]
    async fn test_auth_failure_pauses_until_reauth() {
        let remote = ScriptedRemote::new(Mode::Auth);
        let manager = manager_with(Arc::clone(&remote)).await;

        manager
            .put(collections::EXPENSES, Entity::new("e1", serde_json::json!({})))
            .await
            .unwrap();
        assert!(manager.force_sync().await.is_err());
        assert_eq!(*manager.state.read().await, ManagerState::Paused);

        // paused: further force_sync attempts are rejected without pushes
        let pushes = remote.pushes.load(Ordering::SeqCst);
        assert!(manager.force_sync().await.is_err());
        assert_eq!(remote.pushes.load(Ordering::SeqCst), pushes);

        remote.set_mode(Mode::Ok);
        manager.notify_reauthenticated().await;
        assert_eq!(*manager.state.read().await, ManagerState::Idle);
        manager.force_sync().await.unwrap();
        assert_eq!(manager.status().pending_count, 0);
    }

    #[tokio::test]
    async fn test_remote_change_merges_into_store() {
        let remote = ScriptedRemote::new(Mode::Ok);
        let manager = manager_with(Arc::clone(&remote)).await;

        let entity = Entity::new("e1", serde_json::json!({"amount": 75}));
        let applied = manager
            .merge_remote(RemoteChange {
                collection: collections::EXPENSES.to_string(),
                entity: entity.clone(),
            })
            .await
            .unwrap();
        assert!(applied);

        // replay of the same event is a no-op
        let replayed = manager
            .merge_remote(RemoteChange {
                collection: collections::EXPENSES.to_string(),
                entity,
            })
            .await
            .unwrap();
        assert!(!replayed);

        let stored = manager.get(collections::EXPENSES).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].payload, serde_json::json!({"amount": 75}));
    }

    #[tokio::test]
    async fn test_remote_tombstone_removes_live_entity() {
        let remote = ScriptedRemote::new(Mode::Ok);
        let manager = manager_with(Arc::clone(&remote)).await;

        manager
            .put(collections::EXPENSES, Entity::new("e1", serde_json::json!({"amount": 5})))
            .await
            .unwrap();
        manager.force_sync().await.unwrap();

        let tombstone = Entity::tombstone("e1", Utc::now() + chrono::Duration::seconds(1));
        manager
            .merge_remote(RemoteChange {
                collection: collections::EXPENSES.to_string(),
                entity: tombstone,
            })
            .await
            .unwrap();

        assert!(manager.get(collections::EXPENSES).await.unwrap().is_empty());
    }
}

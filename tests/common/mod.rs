//! Shared test helpers
//!
//! Provides a scripted in-process remote backend so integration tests can
//! exercise the sync engine without a network.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledgersync::error::SyncError;
use ledgersync::model::{Entity, PendingOperation, RemoteChange};
use ledgersync::remote::RemoteClient;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Scripted outcome for one push attempt.
#[derive(Debug, Clone)]
pub enum PushScript {
    Ok,
    Network,
    Auth,
    Validation(String),
    Conflict(Entity),
}

impl PushScript {
    fn into_result(self) -> Result<(), SyncError> {
        match self {
            PushScript::Ok => Ok(()),
            PushScript::Network => Err(SyncError::network("connection refused")),
            PushScript::Auth => Err(SyncError::auth("token expired")),
            PushScript::Validation(message) => Err(SyncError::validation(message)),
            PushScript::Conflict(remote) => Err(SyncError::conflict(remote)),
        }
    }
}

#[derive(Default)]
struct Script {
    queued: VecDeque<PushScript>,
    sticky: Option<PushScript>,
}

/// In-process remote backend with scripted failures and an injectable
/// change feed.
pub struct MockRemote {
    scripts: Mutex<HashMap<String, Script>>,
    pushes: Mutex<Vec<PendingOperation>>,
    overwrites: Mutex<Vec<PendingOperation>>,
    pull_data: Mutex<HashMap<String, Vec<Entity>>>,
    changes_tx: broadcast::Sender<RemoteChange>,
    push_delay: Mutex<Duration>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        let (changes_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            pushes: Mutex::new(Vec::new()),
            overwrites: Mutex::new(Vec::new()),
            pull_data: Mutex::new(HashMap::new()),
            changes_tx,
            push_delay: Mutex::new(Duration::ZERO),
        })
    }

    /// Queue outcomes for pushes of the given entity; once exhausted, pushes
    /// succeed.
    pub fn script(&self, entity_id: &str, outcomes: Vec<PushScript>) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(entity_id.to_string()).or_default().queued = outcomes.into();
    }

    /// Every push of the given entity gets this outcome (after any queued
    /// outcomes are exhausted).
    pub fn script_sticky(&self, entity_id: &str, outcome: PushScript) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(entity_id.to_string()).or_default().sticky = Some(outcome);
    }

    /// Clear any scripting for the given entity; pushes succeed again.
    pub fn clear_script(&self, entity_id: &str) {
        self.scripts.lock().unwrap().remove(entity_id);
    }

    /// Artificial latency per push, to widen race windows.
    pub fn set_push_delay(&self, delay: Duration) {
        *self.push_delay.lock().unwrap() = delay;
    }

    /// Entities returned by `pull` for a collection.
    pub fn set_pull_data(&self, collection: &str, entities: Vec<Entity>) {
        self.pull_data
            .lock()
            .unwrap()
            .insert(collection.to_string(), entities);
    }

    /// Inject a remote-originated change event.
    pub fn emit_change(&self, change: RemoteChange) {
        let _ = self.changes_tx.send(change);
    }

    /// Every recorded push, in order.
    pub fn pushes(&self) -> Vec<PendingOperation> {
        self.pushes.lock().unwrap().clone()
    }

    /// Number of push attempts (overwrites included).
    pub fn push_count(&self) -> usize {
        self.pushes.lock().unwrap().len() + self.overwrites.lock().unwrap().len()
    }

    /// Recorded overwrite calls.
    pub fn overwrites(&self) -> Vec<PendingOperation> {
        self.overwrites.lock().unwrap().clone()
    }

    fn outcome_for(&self, entity_id: &str) -> Result<(), SyncError> {
        let mut scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get_mut(entity_id) else {
            return Ok(());
        };
        if let Some(outcome) = script.queued.pop_front() {
            return outcome.into_result();
        }
        match &script.sticky {
            Some(outcome) => outcome.clone().into_result(),
            None => Ok(()),
        }
    }

    async fn delay(&self) {
        let delay = *self.push_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn push(&self, op: &PendingOperation) -> Result<(), SyncError> {
        self.delay().await;
        self.pushes.lock().unwrap().push(op.clone());
        self.outcome_for(op.entity_id())
    }

    async fn overwrite(&self, op: &PendingOperation) -> Result<(), SyncError> {
        self.delay().await;
        self.overwrites.lock().unwrap().push(op.clone());
        self.outcome_for(op.entity_id())
    }

    async fn pull(
        &self,
        collection: &str,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Entity>, SyncError> {
        Ok(self
            .pull_data
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<RemoteChange> {
        self.changes_tx.subscribe()
    }

    async fn probe(&self) -> Result<(), SyncError> {
        Ok(())
    }
}

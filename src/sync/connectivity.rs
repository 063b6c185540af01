//! # Connectivity Monitor
//!
//! Tracks two independent signals:
//!
//! - **is_online**: host-reported network availability, fed in by the
//!   application via [`ConnectivityMonitor::set_online`] (edge-triggered)
//! - **is_backend_reachable**: result of the last lightweight probe against
//!   the backend, refreshed on a fixed interval and once immediately after
//!   the network comes back
//!
//! Every transition is published over a watch channel consumed by the
//! auto-sync manager. Regaining the network triggers at most one immediate
//! probe per edge, not a burst.

use crate::remote::RemoteClient;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Current connectivity snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connectivity {
    /// Host-reported network availability
    pub is_online: bool,
    /// Result of the last backend reachability probe
    pub is_backend_reachable: bool,
}

impl Connectivity {
    /// Whether sync attempts are worth making right now.
    pub fn is_ok(&self) -> bool {
        self.is_online && self.is_backend_reachable
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        // optimistic until the first probe says otherwise, so a freshly
        // composed engine can sync immediately
        Self {
            is_online: true,
            is_backend_reachable: true,
        }
    }
}

/// Publishes connectivity transitions and runs the reachability probe loop.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: watch::Sender<Connectivity>,
    probe_kick: Notify,
    probe_interval: Duration,
    probe_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    /// Create a monitor probing at the given interval.
    pub fn new(probe_interval: Duration) -> Self {
        let (state, _) = watch::channel(Connectivity::default());
        Self {
            state,
            probe_kick: Notify::new(),
            probe_interval,
            probe_task: Mutex::new(None),
        }
    }

    /// Current snapshot.
    pub fn current(&self) -> Connectivity {
        self.state.borrow().clone()
    }

    /// Subscribe to connectivity transitions.
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    /// Feed in the host's network availability. Edge-triggered: repeated
    /// calls with the same value publish nothing, and an offline→online edge
    /// schedules exactly one immediate reachability probe.
    pub fn set_online(&self, online: bool) {
        let mut regained = false;
        let modified = self.state.send_if_modified(|conn| {
            if conn.is_online == online {
                return false;
            }
            conn.is_online = online;
            regained = online;
            true
        });
        if !modified {
            return;
        }
        if regained {
            tracing::info!("network regained; probing backend");
            self.probe_kick.notify_one();
        } else {
            tracing::info!("network lost");
        }
    }

    /// Record a reachability probe result. Public so a host with its own
    /// health signal can drive it directly.
    pub fn set_backend_reachable(&self, reachable: bool) {
        let modified = self.state.send_if_modified(|conn| {
            if conn.is_backend_reachable == reachable {
                return false;
            }
            conn.is_backend_reachable = reachable;
            true
        });
        if modified {
            tracing::info!(reachable, "backend reachability changed");
        }
    }

    /// Start the background probe loop. Idempotent.
    pub fn start(self: &Arc<Self>, remote: Arc<dyn RemoteClient>) {
        let mut slot = self.probe_task.lock().unwrap();
        if slot.is_some() {
            return;
        }
        let monitor = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            monitor.probe_loop(remote).await;
        }));
    }

    /// Stop the background probe loop.
    pub fn stop(&self) {
        if let Some(task) = self.probe_task.lock().unwrap().take() {
            task.abort();
        }
    }

    async fn probe_loop(self: Arc<Self>, remote: Arc<dyn RemoteClient>) {
        let mut interval = tokio::time::interval(self.probe_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.probe_kick.notified() => {}
            }
            if !self.current().is_online {
                // probing a known-dead network is pointless
                continue;
            }
            let reachable = match remote.probe().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(error = %e, "reachability probe failed");
                    false
                }
            };
            self.set_backend_reachable(reachable);
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.probe_task.lock().unwrap().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::model::{Entity, PendingOperation, RemoteChange};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    struct ProbeCounter {
        probes: AtomicUsize,
        healthy: AtomicBool,
        changes: broadcast::Sender<RemoteChange>,
    }

    impl ProbeCounter {
        fn new(healthy: bool) -> Self {
            let (changes, _) = broadcast::channel(8);
            Self {
                probes: AtomicUsize::new(0),
                healthy: AtomicBool::new(healthy),
                changes,
            }
        }
    }

    #[async_trait]
    impl RemoteClient for ProbeCounter {
        async fn push(&self, _op: &PendingOperation) -> Result<(), SyncError> {
            Ok(())
        }
        async fn overwrite(&self, _op: &PendingOperation) -> Result<(), SyncError> {
            Ok(())
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
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(SyncError::network("probe failed"))
            }
        }
    }

    #[test]
    fn test_default_is_optimistic() {
        let conn = Connectivity::default();
        assert!(conn.is_ok());
    }

    #[tokio::test]
    async fn test_offline_edge_is_published() {
        let monitor = ConnectivityMonitor::new(Duration::from_secs(30));
        let mut rx = monitor.subscribe();

        monitor.set_online(false);
        rx.changed().await.unwrap();
        let conn = rx.borrow_and_update().clone();
        assert!(!conn.is_online);
        assert!(!conn.is_ok());
    }

    #[tokio::test]
    async fn test_repeated_set_online_publishes_once() {
        let monitor = ConnectivityMonitor::new(Duration::from_secs(30));
        let mut rx = monitor.subscribe();

        monitor.set_online(true); // already online: no edge
        assert!(!rx.has_changed().unwrap());

        monitor.set_online(false);
        monitor.set_online(false);
        rx.changed().await.unwrap();
        rx.borrow_and_update();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_probe_runs_on_start_and_on_regained_edge() {
        let remote = Arc::new(ProbeCounter::new(true));
        // long interval so only the initial tick and edge kicks fire
        let monitor = Arc::new(ConnectivityMonitor::new(Duration::from_secs(3600)));
        monitor.start(Arc::clone(&remote) as Arc<dyn RemoteClient>);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(remote.probes.load(Ordering::SeqCst), 1);

        // staying online is not an edge
        monitor.set_online(true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(remote.probes.load(Ordering::SeqCst), 1);

        monitor.set_online(false);
        monitor.set_online(true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(remote.probes.load(Ordering::SeqCst), 2);

        monitor.stop();
    }

    #[tokio::test]
    async fn test_failed_probe_marks_backend_unreachable() {
        let remote = Arc::new(ProbeCounter::new(false));
        let monitor = Arc::new(ConnectivityMonitor::new(Duration::from_secs(3600)));
        monitor.start(Arc::clone(&remote) as Arc<dyn RemoteClient>);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let conn = monitor.current();
        assert!(conn.is_online);
        assert!(!conn.is_backend_reachable);
        assert!(!conn.is_ok());

        monitor.stop();
    }
}

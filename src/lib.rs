//! Ledgersync - Offline-First Expense Sync Engine
//!
//! Ledgersync is the synchronization core of the Ledgerly expense tracker:
//! an offline-first data layer that writes every mutation to a local store
//! immediately, queues it for the backend, and reconciles the two sides as
//! connectivity allows.
//!
//! # Overview
//!
//! The engine provides:
//! - A local persistent store (SQLite) holding the authoritative copy of
//!   every entity collection while offline
//! - A persisted pending-operation queue with per-entity coalescing
//! - A connectivity monitor combining host network events with backend
//!   reachability probes
//! - A pluggable remote client (HTTP implementation included) for pushing
//!   operations, pulling reconciliation snapshots, and receiving live
//!   remote changes
//! - The auto-sync manager: the state machine that ties it all together and
//!   exposes the status read model the UI observes
//!
//! # Module Structure
//!
//! - **`model`** - entities, pending operations, change events, sync status
//! - **`error`** - the failure taxonomy (`StoreError`, `SyncError`)
//! - **`config`** - tunables with defaults, a builder, and TOML loading
//! - **`store`** - the SQLite-backed local persistent store
//! - **`offline`** - the pending queue and retry backoff policy
//! - **`remote`** - the `RemoteClient` seam and its HTTP implementation
//! - **`sync`** - the auto-sync manager, connectivity monitor, status and
//!   metrics surfaces
//!
//! # Usage
//!
//! ```rust,no_run
//! use ledgersync::config::SyncConfig;
//! use ledgersync::model::{collections, Entity};
//! use ledgersync::remote::{HttpRemoteClient, HttpRemoteConfig, RemoteClient};
//! use ledgersync::store::LocalStore;
//! use ledgersync::sync::{AutoSyncManager, ConnectivityMonitor};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::default();
//! let store = Arc::new(LocalStore::open_default().await?);
//! let remote = Arc::new(HttpRemoteClient::new(
//!     HttpRemoteConfig::new("https://sync.example.com"),
//! )?);
//! remote.start_change_feed();
//! let connectivity = Arc::new(ConnectivityMonitor::new(config.probe_interval()));
//!
//! let manager = AutoSyncManager::new(
//!     store,
//!     remote.clone() as Arc<dyn RemoteClient>,
//!     connectivity,
//!     config,
//! )
//! .await?;
//! manager.start();
//!
//! // the data layer the rest of the app talks to
//! let expense = Entity::new("e1", serde_json::json!({"amount": 12.5}));
//! manager.put(collections::EXPENSES, expense).await?;
//! manager.force_sync().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency Model
//!
//! Everything runs on the tokio runtime; there is no parallel flush
//! machinery. At most one flush cycle is in flight at a time, the cycle
//! processes its batch sequentially to keep per-collection FIFO ordering
//! deterministic, and all cross-task state is channel-published or behind
//! `Arc<RwLock<...>>`.
//!
//! # Error Handling
//!
//! Transient network failures are absorbed by the manager and retried with
//! exponential backoff; the UI only ever observes the `SyncStatus` read
//! model. Authentication failures pause sync until the application signals
//! re-authentication, and backend-rejected operations are parked, visible,
//! and never retried automatically.

/// Core data types
pub mod model;

/// Failure taxonomy
pub mod error;

/// Engine configuration
pub mod config;

/// Local persistent store (SQLite)
pub mod store;

/// Pending queue and retry policy
pub mod offline;

/// Remote client seam and HTTP implementation
pub mod remote;

/// Auto-sync orchestration
pub mod sync;

pub use config::SyncConfig;
pub use error::{StoreError, SyncError};
pub use model::{Entity, OperationKind, PendingOperation, RemoteChange, SyncStatus};
pub use remote::RemoteClient;
pub use store::LocalStore;
pub use sync::{AutoSyncManager, Connectivity, ConnectivityMonitor, SyncMetrics};

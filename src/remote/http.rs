//! HTTP implementation of the remote sync client
//!
//! Talks to the expense backend's REST surface:
//!
//! - `PUT  /api/collections/{collection}/{id}` - upsert an entity (idempotent)
//! - `DELETE /api/collections/{collection}/{id}` - delete; 404 is a no-op
//! - `GET  /api/collections/{collection}?since=` - incremental pull
//! - `GET  /api/changes?since=&wait=` - long-poll change feed
//! - `GET  /health` - reachability probe
//!
//! Status codes map onto the engine's failure taxonomy: 409 is a conflict
//! (the body carries the current remote entity), 401/403 pause sync until
//! re-authentication, 400/422 reject the operation permanently, everything
//! else transport-shaped is transient.

use crate::error::SyncError;
use crate::model::{Entity, OperationKind, PendingOperation, RemoteChange};
use crate::remote::RemoteClient;
use crate::store::fmt_ts;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

/// Broadcast capacity for the change feed; slow consumers observe a lag
/// error and resynchronize via `pull`.
const CHANGE_FEED_CAPACITY: usize = 256;
/// Pause between change-feed polls after a transport failure
const FEED_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Configuration for the HTTP remote client.
#[derive(Debug, Clone)]
pub struct HttpRemoteConfig {
    /// Backend base URL, e.g. `https://sync.example.com`
    pub base_url: String,
    /// Bearer token; `None` in single-user/local mode
    pub token: Option<String>,
    /// How long the server may hold a change-feed poll open (seconds)
    pub poll_wait_secs: u64,
    /// Per-request timeout for ordinary calls (seconds)
    pub request_timeout_secs: u64,
}

impl HttpRemoteConfig {
    /// Config with defaults for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            poll_wait_secs: 25,
            request_timeout_secs: 30,
        }
    }
}

/// `RemoteClient` over the backend's REST surface.
pub struct HttpRemoteClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
    poll_wait: Duration,
    changes_tx: broadcast::Sender<RemoteChange>,
    feed_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl HttpRemoteClient {
    /// Build a client from configuration.
    pub fn new(config: HttpRemoteConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::network(format!("cannot build HTTP client: {}", e)))?;
        let (changes_tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(config.token),
            poll_wait: Duration::from_secs(config.poll_wait_secs),
            changes_tx,
            feed_task: Mutex::new(None),
        })
    }

    /// Replace the bearer token, e.g. after re-authentication.
    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    /// Start the long-poll change feed. Idempotent.
    pub fn start_change_feed(self: &Arc<Self>) {
        let mut slot = self.feed_task.lock().unwrap();
        if slot.is_some() {
            return;
        }
        let client = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            client.change_feed_loop().await;
        }));
    }

    /// Stop the long-poll change feed.
    pub fn stop_change_feed(&self) {
        if let Some(task) = self.feed_task.lock().unwrap().take() {
            task.abort();
        }
    }

    async fn change_feed_loop(self: Arc<Self>) {
        // changes before the feed started are covered by hydration/pull
        let mut cursor = Utc::now();
        loop {
            match self.poll_changes(cursor).await {
                Ok(changes) => {
                    for change in changes {
                        if change.entity.last_modified > cursor {
                            cursor = change.entity.last_modified;
                        }
                        // no receivers is fine; send only fails then
                        let _ = self.changes_tx.send(change);
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "change feed poll failed");
                    tokio::time::sleep(FEED_ERROR_BACKOFF).await;
                }
            }
        }
    }

    async fn poll_changes(&self, cursor: DateTime<Utc>) -> Result<Vec<RemoteChange>, SyncError> {
        let request = self
            .http
            .get(self.endpoint("/api/changes"))
            .query(&[
                ("since", fmt_ts(cursor)),
                ("wait", self.poll_wait.as_secs().to_string()),
            ])
            // the server holds the poll open for `wait`; allow that plus slack
            .timeout(self.poll_wait + Duration::from_secs(10));
        let response = self.authorized(request).await.send().await?;
        if !response.status().is_success() {
            return Err(classify(response).await);
        }
        Ok(response.json::<Vec<RemoteChange>>().await?)
    }

    async fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.read().await.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn entity_url(&self, op: &PendingOperation) -> String {
        self.endpoint(&format!(
            "/api/collections/{}/{}",
            op.collection,
            op.entity.id
        ))
    }

    async fn apply(&self, op: &PendingOperation, force: bool) -> Result<(), SyncError> {
        let url = self.entity_url(op);
        let request = match op.kind {
            OperationKind::Delete => {
                let mut query = vec![("last_modified", fmt_ts(op.entity.last_modified))];
                if force {
                    query.push(("force", "true".to_string()));
                }
                self.http.delete(&url).query(&query)
            }
            OperationKind::Create | OperationKind::Update => {
                let mut request = self.http.put(&url).json(&op.entity);
                if force {
                    request = request.query(&[("force", "true")]);
                }
                request
            }
        };

        let response = self.authorized(request).await.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        // deleting something already gone is a success per the idempotency
        // contract
        if op.kind == OperationKind::Delete && status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(classify(response).await)
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn push(&self, op: &PendingOperation) -> Result<(), SyncError> {
        self.apply(op, false).await
    }

    async fn overwrite(&self, op: &PendingOperation) -> Result<(), SyncError> {
        self.apply(op, true).await
    }

    async fn pull(
        &self,
        collection: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Entity>, SyncError> {
        let mut request = self
            .http
            .get(self.endpoint(&format!("/api/collections/{}", collection)));
        if let Some(since) = since {
            request = request.query(&[("since", fmt_ts(since))]);
        }
        let response = self.authorized(request).await.send().await?;
        if !response.status().is_success() {
            return Err(classify(response).await);
        }
        Ok(response.json::<Vec<Entity>>().await?)
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<RemoteChange> {
        self.changes_tx.subscribe()
    }

    async fn probe(&self) -> Result<(), SyncError> {
        let response = self.http.get(self.endpoint("/health")).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SyncError::network(format!(
                "health check returned {}",
                response.status()
            )))
        }
    }
}

impl Drop for HttpRemoteClient {
    fn drop(&mut self) {
        self.stop_change_feed();
    }
}

/// Map an error response onto the engine's failure taxonomy.
async fn classify(response: reqwest::Response) -> SyncError {
    let status = response.status();
    match status.as_u16() {
        401 | 403 => SyncError::auth(body_or_status(response).await),
        400 | 422 => SyncError::validation(body_or_status(response).await),
        409 => match response.json::<Entity>().await {
            Ok(remote) => SyncError::conflict(remote),
            Err(e) => SyncError::network(format!("unreadable conflict body: {}", e)),
        },
        _ => SyncError::network(format!("backend returned {}", status)),
    }
}

async fn body_or_status(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.is_empty() => body,
        _ => status.to_string(),
    }
}

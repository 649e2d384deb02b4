//! Remote persistence with a local-durability fallback.
//!
//! The gateway abstracts "load document, save section, list documents"
//! against a remote service. Every save writes through local persistence
//! before any network attempt, remote calls are bounded by a timeout, and a
//! failed save degrades to a pending marker instead of an error — losing an
//! edit is the one failure this engine is not allowed to have.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Serialize;

use crate::models::document::DocumentSummary;
use crate::models::response::Response;
use crate::models::session::SessionProvider;
use crate::models::template::Template;
use crate::store::{DocumentStore, StoreError};

// ═══════════════════════════════════════════════════════════════════════════
// Remote seam
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("remote resource not found: {0}")]
    NotFound(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("access denied")]
    Denied,
    #[error("malformed remote payload: {0}")]
    Malformed(String),
}

/// The remote template/response service, as the engine sees it.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn fetch_template(&self, template_id: &str) -> Result<Template, RemoteError>;
    async fn fetch_response(&self, response_id: &str) -> Result<Response, RemoteError>;
    async fn save_response(&self, response: &Response) -> Result<(), RemoteError>;
    async fn list_responses(&self, owner: &str) -> Result<Vec<Response>, RemoteError>;
}

/// HTTP implementation of the remote seam.
///
/// `GET /templates/{id}`, `GET`/`PUT /responses/{id}`,
/// `GET /responses?owner=` — JSON bodies throughout.
pub struct HttpRemote {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        what: &str,
    ) -> Result<T, RemoteError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(what.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Denied),
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| RemoteError::Malformed(e.to_string())),
            status => Err(RemoteError::Network(format!("unexpected status {status}"))),
        }
    }

    async fn put_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Denied),
            status if status.is_success() => Ok(()),
            status => Err(RemoteError::Network(format!("unexpected status {status}"))),
        }
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn fetch_template(&self, template_id: &str) -> Result<Template, RemoteError> {
        self.get_json(&format!("templates/{template_id}"), template_id)
            .await
    }

    async fn fetch_response(&self, response_id: &str) -> Result<Response, RemoteError> {
        self.get_json(&format!("responses/{response_id}"), response_id)
            .await
    }

    async fn save_response(&self, response: &Response) -> Result<(), RemoteError> {
        self.put_json(&format!("responses/{}", response.id), response)
            .await
    }

    async fn list_responses(&self, owner: &str) -> Result<Vec<Response>, RemoteError> {
        let response = self
            .client
            .get(self.url("responses"))
            .query(&[("owner", owner)])
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Denied),
            status if status.is_success() => response
                .json()
                .await
                .map_err(|e| RemoteError::Malformed(e.to_string())),
            status => Err(RemoteError::Network(format!("unexpected status {status}"))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Sync gateway
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("re-authentication required")]
    Unauthenticated,
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("document {0} has incomplete sections")]
    Incomplete(String),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SyncError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => SyncError::NotFound(id),
            other => SyncError::Store(other),
        }
    }
}

/// Outcome of a save attempt. `pending_sync` means the edit is durable
/// locally and will be retried on the next resync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedMarker {
    pub document_id: String,
    #[serde(rename = "pendingSync")]
    pub pending_sync: bool,
    pub synced_at: Option<DateTime<Utc>>,
}

pub struct SyncGateway {
    remote: Arc<dyn RemoteApi>,
    store: Arc<DocumentStore>,
    sessions: Arc<dyn SessionProvider>,
    remote_timeout: Duration,
}

impl SyncGateway {
    pub fn new(
        remote: Arc<dyn RemoteApi>,
        store: Arc<DocumentStore>,
        sessions: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            remote,
            store,
            sessions,
            remote_timeout: crate::config::REMOTE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, remote_timeout: Duration) -> Self {
        self.remote_timeout = remote_timeout;
        self
    }

    /// Save one document remotely, falling back to local-pending.
    ///
    /// Local persistence is flushed before the network attempt; a missing
    /// or expired session surfaces as `Unauthenticated` with every local
    /// edit intact.
    pub async fn save(&self, document_id: &str) -> Result<SavedMarker, SyncError> {
        let document = self.store.load(document_id)?;
        self.store.flush()?;
        let session = self
            .sessions
            .verified_session()
            .ok_or(SyncError::Unauthenticated)?;
        let response = Response::from_document(&document, &session.user);

        let outcome = tokio::time::timeout(
            self.remote_timeout,
            self.remote.save_response(&response),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                let finalized = self.store.mark_synced(document_id)?;
                tracing::info!(document = document_id, finalized, "remote save succeeded");
                Ok(SavedMarker {
                    document_id: document_id.to_string(),
                    pending_sync: false,
                    synced_at: Some(Utc::now()),
                })
            }
            Ok(Err(RemoteError::Denied)) => {
                self.store.mark_pending(document_id)?;
                Err(SyncError::Unauthenticated)
            }
            Ok(Err(error)) => {
                self.store.mark_pending(document_id)?;
                tracing::warn!(
                    document = document_id,
                    error = %error,
                    "remote save failed, edits kept locally"
                );
                Ok(self.pending_marker(document_id))
            }
            Err(_elapsed) => {
                self.store.mark_pending(document_id)?;
                tracing::warn!(document = document_id, "remote save timed out, edits kept locally");
                Ok(self.pending_marker(document_id))
            }
        }
    }

    /// Final submission: every section must be complete; the document is
    /// sealed before the save so the retried payload cannot drift. On a
    /// successful remote save the document leaves the store for good.
    pub async fn submit(&self, document_id: &str) -> Result<SavedMarker, SyncError> {
        let registry = self.store.registry_for(document_id)?;
        let document = self.store.load(document_id)?;
        if !document.all_sections_complete(&registry) {
            return Err(SyncError::Incomplete(document_id.to_string()));
        }
        self.store.seal(document_id)?;
        self.save(document_id).await
    }

    /// One best-effort pass over every pending document, oldest edits
    /// first so the earliest work is never starved. No backoff timers;
    /// callers invoke this on reconnect or app foreground.
    pub async fn resync_pending(&self) -> Vec<(String, Result<SavedMarker, SyncError>)> {
        let pending = match self.store.pending_documents() {
            Ok(pending) => pending,
            Err(error) => {
                tracing::error!(error = %error, "could not enumerate pending documents");
                return Vec::new();
            }
        };
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "resyncing pending documents");
        }

        let mut results = Vec::with_capacity(pending.len());
        for document_id in pending {
            let result = self.save(&document_id).await;
            results.push((document_id, result));
        }
        results
    }

    /// Session-gated document listing: the remote view merged over local
    /// summaries, or local-only when the network is away.
    pub async fn list(&self) -> Result<Vec<DocumentSummary>, SyncError> {
        let session = self
            .sessions
            .verified_session()
            .ok_or(SyncError::Unauthenticated)?;
        let local = self.store.list()?;

        let outcome = tokio::time::timeout(
            self.remote_timeout,
            self.remote.list_responses(&session.user),
        )
        .await;

        match outcome {
            Ok(Ok(responses)) => {
                // Local copies win: they may hold edits the remote has not
                // seen yet.
                let seen: BTreeSet<String> = local.iter().map(|s| s.id.clone()).collect();
                let mut summaries = local;
                for response in responses {
                    if !seen.contains(&response.document.id) {
                        summaries.push(response.document.summary());
                    }
                }
                summaries.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
                Ok(summaries)
            }
            Ok(Err(RemoteError::Denied)) => Err(SyncError::Unauthenticated),
            Ok(Err(error)) => {
                tracing::warn!(error = %error, "remote list failed, serving local documents");
                Ok(local)
            }
            Err(_elapsed) => {
                tracing::warn!("remote list timed out, serving local documents");
                Ok(local)
            }
        }
    }

    fn pending_marker(&self, document_id: &str) -> SavedMarker {
        SavedMarker {
            document_id: document_id.to_string(),
            pending_sync: true,
            synced_at: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Scripted remote for tests
// ═══════════════════════════════════════════════════════════════════════════


// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

//! Template ↔ response reconciliation.
//!
//! Materializes the document the store holds from remote template and
//! response data: cache-first template fetch, staleness detection on the
//! bound version, orphan-preserving merge, and an explicit two-phase
//! begin/apply so a fetch that resolves after the user moved on is
//! discarded instead of resurrecting stale state.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::gateway::{RemoteApi, RemoteError};
use crate::models::document::{Document, DocumentStatus};
use crate::models::response::Response;
use crate::models::template::Template;
use crate::schema::registry::SchemaRegistry;
use crate::store::{DocumentStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    #[error("response not found: {0}")]
    ResponseNotFound(String),
    #[error(
        "response bound to template version {response_version}, current is {template_version}"
    )]
    StaleTemplate {
        response_version: u32,
        template_version: u32,
    },
    #[error("reconcile for document {0} was superseded")]
    Superseded(String),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal lock error")]
    LockPoisoned,
}

/// Issued by [`Reconciler::begin`]; pins the document generation and the
/// moment the fetch started so the apply phase can tell fresh local edits
/// from data the fetch already saw.
#[derive(Debug, Clone)]
pub struct ReconcileTicket {
    document_id: String,
    generation: u64,
    started_at: DateTime<Utc>,
}

pub struct Reconciler {
    remote: Arc<dyn RemoteApi>,
    store: Arc<DocumentStore>,
    templates: RwLock<BTreeMap<String, Arc<Template>>>,
    generations: RwLock<BTreeMap<String, u64>>,
}

impl Reconciler {
    pub fn new(remote: Arc<dyn RemoteApi>, store: Arc<DocumentStore>) -> Self {
        Self {
            remote,
            store,
            templates: RwLock::new(BTreeMap::new()),
            generations: RwLock::new(BTreeMap::new()),
        }
    }

    // ── Template cache ──────────────────────────────────────

    /// Cache-first template lookup. Templates are immutable once fetched;
    /// a new server-side version only becomes visible through
    /// [`refresh_template`](Self::refresh_template).
    pub async fn template(&self, template_id: &str) -> Result<Arc<Template>, ReconcileError> {
        let cached = self
            .templates
            .read()
            .map_err(|_| ReconcileError::LockPoisoned)?
            .get(template_id)
            .cloned();
        if let Some(template) = cached {
            return Ok(template);
        }
        self.fetch_and_cache(template_id).await
    }

    /// Bypass the cache; used when a stale response suggests the server has
    /// moved to a newer template version.
    pub async fn refresh_template(&self, template_id: &str) -> Result<Arc<Template>, ReconcileError> {
        self.fetch_and_cache(template_id).await
    }

    async fn fetch_and_cache(&self, template_id: &str) -> Result<Arc<Template>, ReconcileError> {
        let template = match self.remote.fetch_template(template_id).await {
            Ok(template) => Arc::new(template),
            Err(RemoteError::NotFound(_)) => {
                return Err(ReconcileError::TemplateNotFound(template_id.to_string()))
            }
            Err(error) => return Err(error.into()),
        };
        self.templates
            .write()
            .map_err(|_| ReconcileError::LockPoisoned)?
            .insert(template_id.to_string(), Arc::clone(&template));
        tracing::debug!(
            template = template_id,
            version = template.version,
            "template cached"
        );
        Ok(template)
    }

    // ── Reconcile ───────────────────────────────────────────

    /// Produce the document for a template (and optionally a stored
    /// response). Idempotent: with unchanged remote state, repeated calls
    /// yield documents with the same identity, section values and
    /// completeness flags — a synthesized draft carries a deterministic id
    /// per template version. The result is not installed in the store —
    /// run it through [`begin`](Self::begin)/[`apply`](Self::apply), which
    /// guards against racing local edits.
    pub async fn reconcile(
        &self,
        template_id: &str,
        response_id: Option<&str>,
    ) -> Result<Document, ReconcileError> {
        let template = self.template(template_id).await?;
        let registry = Arc::new(SchemaRegistry::from_template(&template));
        self.store.register_registry(Arc::clone(&registry))?;

        let Some(response_id) = response_id else {
            // One standing draft per template version: a reload finds the
            // same identity instead of minting a new one, and a draft the
            // store already holds is returned as-is, never re-synthesized
            // empty.
            let draft_id = draft_document_id(&template);
            if let Ok(existing) = self.store.load(&draft_id) {
                return Ok(existing);
            }
            let mut document = Document::new(draft_id, template.key());
            document.recompute_complete(&registry);
            return Ok(document);
        };

        let response = match self.remote.fetch_response(response_id).await {
            Ok(response) => response,
            Err(RemoteError::NotFound(_)) => {
                return Err(ReconcileError::ResponseNotFound(response_id.to_string()))
            }
            Err(error) => return Err(error.into()),
        };

        if response.template_id != template.id {
            tracing::warn!(
                response = response_id,
                bound = %response.template_id,
                fetched = %template.id,
                "response bound to a different template"
            );
        }
        if response.template_version != template.version {
            return Err(ReconcileError::StaleTemplate {
                response_version: response.template_version,
                template_version: template.version,
            });
        }

        Ok(materialize(&template, response, &registry))
    }

    /// Rebind a stale response to the current template: sections new in the
    /// template start untouched, obsolete ones are carried as orphans. Never
    /// invoked automatically — the caller chooses migration after seeing
    /// [`ReconcileError::StaleTemplate`].
    pub fn migrate_stale(
        &self,
        response: &Response,
        template: &Template,
    ) -> Result<Document, ReconcileError> {
        let registry = Arc::new(SchemaRegistry::from_template(template));
        self.store.register_registry(Arc::clone(&registry))?;
        let document = materialize(template, response.clone(), &registry);
        tracing::info!(
            response = %response.id,
            from_version = response.template_version,
            to_version = template.version,
            orphaned = document.orphaned.len(),
            "migrated stale response"
        );
        Ok(document)
    }

    // ── Two-phase apply ─────────────────────────────────────

    /// Phase one: record that a reconcile for this document is in flight.
    pub fn begin(&self, document_id: &str) -> ReconcileTicket {
        let generation = self
            .generations
            .read()
            .ok()
            .and_then(|generations| generations.get(document_id).copied())
            .unwrap_or(0);
        ReconcileTicket {
            document_id: document_id.to_string(),
            generation,
            started_at: Utc::now(),
        }
    }

    /// Invalidate outstanding tickets for a document (route changed, the
    /// document was removed or recreated). In-flight results for old
    /// tickets will be discarded at apply time.
    pub fn invalidate(&self, document_id: &str) {
        if let Ok(mut generations) = self.generations.write() {
            *generations.entry(document_id.to_string()).or_insert(0) += 1;
        }
    }

    /// Phase two: install a reconciled document, unless superseded.
    ///
    /// Remote data merges *under* local edits: a section written locally
    /// after the ticket was issued keeps its local value unless the remote
    /// copy is explicitly newer by its own section timestamp. A slow fetch
    /// can therefore never stomp a fast local edit.
    pub fn apply(
        &self,
        ticket: ReconcileTicket,
        mut incoming: Document,
    ) -> Result<Document, ReconcileError> {
        let current = self
            .generations
            .read()
            .map_err(|_| ReconcileError::LockPoisoned)?
            .get(&ticket.document_id)
            .copied()
            .unwrap_or(0);
        if current != ticket.generation {
            tracing::debug!(
                document = %ticket.document_id,
                "discarding superseded reconcile result"
            );
            return Err(ReconcileError::Superseded(ticket.document_id));
        }

        if let Ok(local) = self.store.load(&ticket.document_id) {
            let mut kept_local = false;
            for (key, local_value) in &local.sections {
                let local_written = local.section_modified.get(key).copied();
                let written_after_begin =
                    local_written.is_some_and(|written| written > ticket.started_at);
                let remote_newer = match (incoming.section_modified.get(key), local_written) {
                    (Some(remote), Some(local)) => *remote > local,
                    (Some(_), None) => true,
                    _ => false,
                };
                if written_after_begin && !remote_newer {
                    incoming.sections.insert(key.clone(), local_value.clone());
                    if let Some(written) = local_written {
                        incoming.section_modified.insert(key.clone(), written);
                    }
                    kept_local = true;
                }
            }
            if kept_local {
                incoming.last_modified = incoming.last_modified.max(local.last_modified);
                if incoming.status == DocumentStatus::Synced {
                    incoming.status = DocumentStatus::Dirty;
                }
                tracing::debug!(
                    document = %ticket.document_id,
                    "kept local edits over slower remote state"
                );
            }
        }

        self.store.adopt(incoming.clone())?;
        Ok(incoming)
    }
}

/// Deterministic document id for the standing draft of a template version.
fn draft_document_id(template: &Template) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}/v{}", template.id, template.version).as_bytes(),
    )
    .to_string()
}

/// Merge a fetched response under the template's current section list.
/// Sections the template no longer declares are preserved as orphans.
fn materialize(template: &Template, response: Response, registry: &SchemaRegistry) -> Document {
    let mut document = response.document;
    document.template_key = template.key();
    document.orphaned = document
        .sections
        .keys()
        .filter(|key| !template.has_section(key))
        .cloned()
        .collect();
    document.recompute_complete(registry);
    document
}

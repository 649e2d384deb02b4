//! Process-wide document store: the single writer of all document state.
//!
//! Explicitly constructed and passed by reference (`Arc<DocumentStore>`),
//! never implicit module state. All operations are synchronous and
//! serialized behind one `RwLock`; network code never holds the lock and
//! only touches the store once its result has resolved. Every successful
//! mutation flushes the persisted blob before returning, so the durable
//! copy never trails the in-memory one.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;

use crate::models::document::{Document, DocumentStatus, DocumentSummary};
use crate::models::template::TemplateKey;
use crate::persist::{PersistError, PersistedState, Persistence};
use crate::schema::registry::SchemaRegistry;
use crate::schema::ValidationError;

// ═══════════════════════════════════════════════════════════════════════════
// Error types
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("document already exists: {0}")]
    AlreadyExists(String),
    #[error("unknown section '{section}' for document {document}")]
    UnknownSection { document: String, section: String },
    #[error("document {0} is sealed by submission")]
    Sealed(String),
    #[error("no registry installed for template '{0}'")]
    RegistryMissing(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("internal lock error")]
    LockPoisoned,
    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),
}

// ═══════════════════════════════════════════════════════════════════════════
// DocumentStore
// ═══════════════════════════════════════════════════════════════════════════

/// Single source of truth for every in-progress document this session.
pub struct DocumentStore {
    inner: RwLock<StoreInner>,
    watchers: RwLock<BTreeMap<(String, String), watch::Sender<u64>>>,
    persistence: Persistence,
}

struct StoreInner {
    user: Option<String>,
    documents: BTreeMap<String, Document>,
    notes: BTreeMap<String, String>,
    registries: BTreeMap<TemplateKey, Arc<SchemaRegistry>>,
}

impl StoreInner {
    fn fresh() -> Self {
        let mut registries = BTreeMap::new();
        registries.insert(TemplateKey::Prf, Arc::new(SchemaRegistry::prf()));
        Self {
            user: None,
            documents: BTreeMap::new(),
            notes: BTreeMap::new(),
            registries,
        }
    }

    fn snapshot(&self) -> PersistedState {
        PersistedState {
            user: self.user.clone(),
            documents: self.documents.values().cloned().collect(),
            notes_by_document_id: self.notes.clone(),
        }
    }
}

impl DocumentStore {
    /// New store over the given persistence. Call [`init`](Self::init) to
    /// restore prior state from the blob.
    pub fn new(persistence: Persistence) -> Self {
        Self {
            inner: RwLock::new(StoreInner::fresh()),
            watchers: RwLock::new(BTreeMap::new()),
            persistence,
        }
    }

    /// Ephemeral store for tests.
    pub fn in_memory() -> Self {
        Self::new(Persistence::in_memory())
    }

    /// Restore documents, notes and the user from the persisted blob.
    ///
    /// Completeness flags are recomputed; the registry is the authority and
    /// a mismatch with the stored flags is logged, not trusted.
    pub fn init(&self) -> Result<(), StoreError> {
        self.persistence.cleanup_stale_temps();
        let Some(state) = self.persistence.load()? else {
            tracing::debug!("no persisted state, starting fresh");
            return Ok(());
        };

        let mut inner = self.write_inner()?;
        inner.user = state.user;
        inner.notes = state.notes_by_document_id;
        for mut document in state.documents {
            if let Some(registry) = inner.registries.get(&document.template_key) {
                let stored = document.complete.clone();
                document.recompute_complete(registry);
                if stored != document.complete {
                    tracing::warn!(
                        document = %document.id,
                        "stored completeness flags disagreed with schema, recomputed"
                    );
                }
            }
            inner.documents.insert(document.id.clone(), document);
        }
        tracing::info!(
            documents = inner.documents.len(),
            notes = inner.notes.len(),
            "restored persisted state"
        );
        Ok(())
    }

    // ── Registries ──────────────────────────────────────────

    /// Install the registry for a template; idempotent for a given key
    /// (registries are immutable once loaded).
    pub fn register_registry(&self, registry: Arc<SchemaRegistry>) -> Result<(), StoreError> {
        let mut inner = self.write_inner()?;
        inner
            .registries
            .entry(registry.template_key().clone())
            .or_insert(registry);
        Ok(())
    }

    /// Registry governing one document.
    pub fn registry_for(&self, document_id: &str) -> Result<Arc<SchemaRegistry>, StoreError> {
        let inner = self.read_inner()?;
        let document = inner
            .documents
            .get(document_id)
            .ok_or_else(|| StoreError::NotFound(document_id.to_string()))?;
        inner
            .registries
            .get(&document.template_key)
            .cloned()
            .ok_or_else(|| {
                StoreError::RegistryMissing(document.template_key.template_id().to_string())
            })
    }

    // ── Document lifecycle ──────────────────────────────────

    /// Start a fresh draft with every section untouched.
    pub fn create(&self, document_id: &str, template_key: TemplateKey) -> Result<(), StoreError> {
        let mut inner = self.write_inner()?;
        if inner.documents.contains_key(document_id) {
            return Err(StoreError::AlreadyExists(document_id.to_string()));
        }
        let registry = inner
            .registries
            .get(&template_key)
            .cloned()
            .ok_or_else(|| StoreError::RegistryMissing(template_key.template_id().to_string()))?;

        let mut document = Document::new(document_id, template_key);
        document.recompute_complete(&registry);
        inner.documents.insert(document_id.to_string(), document);
        tracing::info!(document = document_id, "created draft document");
        self.flush_inner(&inner)
    }

    /// Install a reconciled document, replacing any current copy.
    pub fn adopt(&self, mut document: Document) -> Result<(), StoreError> {
        let mut inner = self.write_inner()?;
        let registry = inner
            .registries
            .get(&document.template_key)
            .cloned()
            .ok_or_else(|| {
                StoreError::RegistryMissing(document.template_key.template_id().to_string())
            })?;
        document.recompute_complete(&registry);
        let id = document.id.clone();
        inner.documents.insert(id.clone(), document);
        self.flush_inner(&inner)?;
        drop(inner);
        self.notify_document(&id);
        Ok(())
    }

    /// Current in-memory copy; `NotFound` tells the caller to reconcile.
    pub fn load(&self, document_id: &str) -> Result<Document, StoreError> {
        let inner = self.read_inner()?;
        inner
            .documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(document_id.to_string()))
    }

    /// Summaries for dashboards, last-modified descending.
    pub fn list(&self) -> Result<Vec<DocumentSummary>, StoreError> {
        let inner = self.read_inner()?;
        let mut summaries: Vec<DocumentSummary> =
            inner.documents.values().map(Document::summary).collect();
        summaries.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(summaries)
    }

    pub fn remove(&self, document_id: &str) -> Result<(), StoreError> {
        let mut inner = self.write_inner()?;
        if inner.documents.remove(document_id).is_none() {
            return Err(StoreError::NotFound(document_id.to_string()));
        }
        inner.notes.remove(document_id);
        self.flush_inner(&inner)?;
        drop(inner);
        self.drop_watchers(document_id);
        tracing::info!(document = document_id, "removed document");
        Ok(())
    }

    /// Full-session teardown (logout). Documents, notes and the user are
    /// cleared in memory and on disk; nothing leaks across identities.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        let mut inner = self.write_inner()?;
        *inner = StoreInner::fresh();
        self.flush_inner(&inner)?;
        drop(inner);
        if let Ok(mut watchers) = self.watchers.write() {
            watchers.clear();
        }
        tracing::info!("store cleared");
        Ok(())
    }

    /// Lifecycle entry point for app start/logout flows.
    pub fn reset(&self) -> Result<(), StoreError> {
        self.clear_all()
    }

    // ── Section writes ──────────────────────────────────────

    /// Validate and commit one section's value.
    ///
    /// All-or-nothing: either the whole value passes shape validation and
    /// commits, or the document is left untouched and the field-level
    /// violations come back. Returns the section's new completeness flag.
    pub fn write_section(
        &self,
        document_id: &str,
        section_key: &str,
        value: Value,
    ) -> Result<bool, StoreError> {
        let mut inner = self.write_inner()?;
        let registry = {
            let document = inner
                .documents
                .get(document_id)
                .ok_or_else(|| StoreError::NotFound(document_id.to_string()))?;
            if document.is_sealed() {
                return Err(StoreError::Sealed(document_id.to_string()));
            }
            inner
                .registries
                .get(&document.template_key)
                .cloned()
                .ok_or_else(|| {
                    StoreError::RegistryMissing(document.template_key.template_id().to_string())
                })?
        };

        let Some(descriptor) = registry.resolve(section_key) else {
            return Err(StoreError::UnknownSection {
                document: document_id.to_string(),
                section: section_key.to_string(),
            });
        };

        if let Err(violations) = descriptor.schema.validate(&value) {
            return Err(StoreError::Validation(ValidationError {
                section: section_key.to_string(),
                violations,
            }));
        }

        let document = inner
            .documents
            .get_mut(document_id)
            .ok_or_else(|| StoreError::NotFound(document_id.to_string()))?;
        document.sections.insert(section_key.to_string(), value);
        let complete = document.recompute_section(&registry, section_key);
        document.mark_modified(section_key);
        tracing::debug!(
            document = document_id,
            section = section_key,
            complete,
            "section committed"
        );

        self.flush_inner(&inner)?;
        drop(inner);
        self.notify_section(document_id, section_key);
        Ok(complete)
    }

    pub fn section_complete(
        &self,
        document_id: &str,
        section_key: &str,
    ) -> Result<bool, StoreError> {
        let inner = self.read_inner()?;
        let document = inner
            .documents
            .get(document_id)
            .ok_or_else(|| StoreError::NotFound(document_id.to_string()))?;
        Ok(document.complete.get(section_key).copied().unwrap_or(false))
    }

    // ── Sync bookkeeping ────────────────────────────────────

    /// Seal the document for final submission; section writes now fail.
    pub fn seal(&self, document_id: &str) -> Result<(), StoreError> {
        let mut inner = self.write_inner()?;
        let document = inner
            .documents
            .get_mut(document_id)
            .ok_or_else(|| StoreError::NotFound(document_id.to_string()))?;
        document.status = DocumentStatus::Submitted;
        self.flush_inner(&inner)
    }

    /// A remote save failed; the local blob is the only durable copy.
    pub fn mark_pending(&self, document_id: &str) -> Result<(), StoreError> {
        let mut inner = self.write_inner()?;
        let document = inner
            .documents
            .get_mut(document_id)
            .ok_or_else(|| StoreError::NotFound(document_id.to_string()))?;
        document.pending_sync = true;
        self.flush_inner(&inner)
    }

    /// A remote save succeeded. Sealed documents are finalized (removed —
    /// the remote copy is now the record); drafts become `Synced`.
    /// Returns true when the document was finalized.
    pub fn mark_synced(&self, document_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.write_inner()?;
        let document = inner
            .documents
            .get_mut(document_id)
            .ok_or_else(|| StoreError::NotFound(document_id.to_string()))?;
        document.pending_sync = false;
        let finalized = document.is_sealed();
        if finalized {
            inner.documents.remove(document_id);
            inner.notes.remove(document_id);
        } else {
            let document = inner
                .documents
                .get_mut(document_id)
                .ok_or_else(|| StoreError::NotFound(document_id.to_string()))?;
            document.status = DocumentStatus::Synced;
        }
        self.flush_inner(&inner)?;
        drop(inner);
        if finalized {
            self.drop_watchers(document_id);
            tracing::info!(document = document_id, "final submission synced");
        }
        Ok(finalized)
    }

    /// Documents awaiting a remote save, oldest edits first.
    pub fn pending_documents(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.read_inner()?;
        let mut pending: Vec<(&String, DateTime<Utc>)> = inner
            .documents
            .iter()
            .filter(|(_, d)| d.pending_sync)
            .map(|(id, d)| (id, d.last_modified))
            .collect();
        pending.sort_by_key(|(_, last_modified)| *last_modified);
        Ok(pending.into_iter().map(|(id, _)| id.clone()).collect())
    }

    /// Force the blob to disk; used before any remote attempt.
    pub fn flush(&self) -> Result<(), StoreError> {
        let inner = self.read_inner()?;
        self.flush_inner(&inner)
    }

    // ── User + notes slice ──────────────────────────────────

    pub fn set_user(&self, user: Option<String>) -> Result<(), StoreError> {
        let mut inner = self.write_inner()?;
        inner.user = user;
        self.flush_inner(&inner)
    }

    pub fn user(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read_inner()?.user.clone())
    }

    /// Free-text note attached to a document id. Independent lifecycle:
    /// clearing a note never invalidates the document.
    pub fn set_note(&self, document_id: &str, note: &str) -> Result<(), StoreError> {
        let mut inner = self.write_inner()?;
        inner
            .notes
            .insert(document_id.to_string(), note.to_string());
        self.flush_inner(&inner)
    }

    pub fn note(&self, document_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_inner()?.notes.get(document_id).cloned())
    }

    pub fn clear_note(&self, document_id: &str) -> Result<(), StoreError> {
        let mut inner = self.write_inner()?;
        inner.notes.remove(document_id);
        self.flush_inner(&inner)
    }

    // ── Section change subscriptions ────────────────────────

    /// Fine-grained change channel for one (document, section) pair.
    ///
    /// The watched value is a revision counter; a write to another section
    /// never wakes this receiver.
    pub fn subscribe(&self, document_id: &str, section_key: &str) -> watch::Receiver<u64> {
        let key = (document_id.to_string(), section_key.to_string());
        let mut watchers = match self.watchers.write() {
            Ok(watchers) => watchers,
            Err(poisoned) => poisoned.into_inner(),
        };
        watchers
            .entry(key)
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    fn notify_section(&self, document_id: &str, section_key: &str) {
        if let Ok(watchers) = self.watchers.read() {
            let key = (document_id.to_string(), section_key.to_string());
            if let Some(sender) = watchers.get(&key) {
                sender.send_modify(|revision| *revision += 1);
            }
        }
    }

    fn notify_document(&self, document_id: &str) {
        if let Ok(watchers) = self.watchers.read() {
            for ((id, _), sender) in watchers.iter() {
                if id == document_id {
                    sender.send_modify(|revision| *revision += 1);
                }
            }
        }
    }

    fn drop_watchers(&self, document_id: &str) {
        if let Ok(mut watchers) = self.watchers.write() {
            watchers.retain(|(id, _), _| id != document_id);
        }
    }

    // ── Internals ───────────────────────────────────────────

    fn read_inner(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreInner>, StoreError> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write_inner(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreInner>, StoreError> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn flush_inner(&self, inner: &StoreInner) -> Result<(), StoreError> {
        self.persistence.save(&inner.snapshot())?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store_with_draft(id: &str) -> DocumentStore {
        let store = DocumentStore::in_memory();
        store.create(id, TemplateKey::Prf).unwrap();
        store
    }

    // -----------------------------------------------------------------------
    // Section writes
    // -----------------------------------------------------------------------

    #[test]
    fn valid_write_commits_exactly_that_section() {
        let store = store_with_draft("D1");
        let value = json!({ "name": "Jane" });

        store
            .write_section("D1", "patient-details", value.clone())
            .unwrap();

        let document = store.load("D1").unwrap();
        assert_eq!(document.sections.get("patient-details"), Some(&value));
        assert_eq!(document.sections.len(), 1);
        assert_eq!(document.complete["patient-details"], true);
        assert_eq!(document.complete["vital-signs"], false);
    }

    #[test]
    fn invalid_write_leaves_document_unchanged() {
        let store = store_with_draft("D1");
        store
            .write_section("D1", "patient-details", json!({ "name": "Jane" }))
            .unwrap();
        let before = store.load("D1").unwrap();

        let result = store.write_section("D1", "vital-signs", json!({ "pulse": "fast" }));
        match result.unwrap_err() {
            StoreError::Validation(e) => {
                assert_eq!(e.section, "vital-signs");
                assert_eq!(e.violations[0].field, "pulse");
            }
            other => panic!("Expected Validation, got: {other}"),
        }

        let after = store.load("D1").unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn partial_write_commits_but_is_incomplete() {
        let store = store_with_draft("D1");
        let complete = store
            .write_section("D1", "vital-signs", json!({ "pulse": 80 }))
            .unwrap();
        assert!(!complete, "respiration-rate still missing");

        let complete = store
            .write_section(
                "D1",
                "vital-signs",
                json!({ "pulse": 80, "respiration-rate": 16 }),
            )
            .unwrap();
        assert!(complete);
        assert!(store.section_complete("D1", "vital-signs").unwrap());
    }

    #[test]
    fn unknown_section_rejected_not_dropped() {
        let store = store_with_draft("D1");
        let result = store.write_section("D1", "blood-bank", json!({}));
        match result.unwrap_err() {
            StoreError::UnknownSection { section, .. } => assert_eq!(section, "blood-bank"),
            other => panic!("Expected UnknownSection, got: {other}"),
        }
        assert!(store.load("D1").unwrap().sections.is_empty());
    }

    #[test]
    fn write_to_missing_document_is_not_found() {
        let store = DocumentStore::in_memory();
        assert!(matches!(
            store.write_section("ghost", "notes", json!({})),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn sealed_document_refuses_writes() {
        let store = store_with_draft("D1");
        store.seal("D1").unwrap();
        assert!(matches!(
            store.write_section("D1", "notes", json!({ "narrative": "x" })),
            Err(StoreError::Sealed(_))
        ));
    }

    #[test]
    fn write_dirties_a_synced_document() {
        let store = store_with_draft("D1");
        store
            .write_section("D1", "notes", json!({ "narrative": "first" }))
            .unwrap();
        store.mark_synced("D1").unwrap();
        assert_eq!(store.load("D1").unwrap().status, DocumentStatus::Synced);

        store
            .write_section("D1", "notes", json!({ "narrative": "second" }))
            .unwrap();
        assert_eq!(store.load("D1").unwrap().status, DocumentStatus::Dirty);
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn create_duplicate_rejected() {
        let store = store_with_draft("D1");
        assert!(matches!(
            store.create("D1", TemplateKey::Prf),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn create_without_registry_rejected() {
        let store = DocumentStore::in_memory();
        let key = TemplateKey::Dynamic {
            template_id: "T9".into(),
            version: 1,
        };
        assert!(matches!(
            store.create("D1", key),
            Err(StoreError::RegistryMissing(_))
        ));
    }

    #[test]
    fn list_orders_by_last_modified_descending() {
        let store = DocumentStore::in_memory();
        store.create("older", TemplateKey::Prf).unwrap();
        store
            .write_section("older", "notes", json!({ "narrative": "a" }))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.create("newer", TemplateKey::Prf).unwrap();
        store
            .write_section("newer", "notes", json!({ "narrative": "b" }))
            .unwrap();

        let summaries = store.list().unwrap();
        assert_eq!(summaries[0].id, "newer");
        assert_eq!(summaries[1].id, "older");
    }

    #[test]
    fn remove_drops_document_and_note() {
        let store = store_with_draft("D1");
        store.set_note("D1", "call back").unwrap();
        store.remove("D1").unwrap();
        assert!(matches!(store.load("D1"), Err(StoreError::NotFound(_))));
        assert!(store.note("D1").unwrap().is_none());
        assert!(matches!(store.remove("D1"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn clear_all_leaves_nothing_loadable() {
        let store = store_with_draft("D1");
        store.set_user(Some("medic-7".into())).unwrap();
        store.set_note("D1", "note").unwrap();
        store
            .write_section("D1", "patient-details", json!({ "name": "Jane" }))
            .unwrap();

        store.clear_all().unwrap();

        assert!(store.list().unwrap().is_empty());
        assert!(store.user().unwrap().is_none());
        assert!(store.note("D1").unwrap().is_none());
        assert!(matches!(store.load("D1"), Err(StoreError::NotFound(_))));
    }

    // -----------------------------------------------------------------------
    // Persistence round trip
    // -----------------------------------------------------------------------

    #[test]
    fn state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = DocumentStore::new(Persistence::disk(dir.path(), "state.json"));
            store.create("D1", TemplateKey::Prf).unwrap();
            store
                .write_section("D1", "patient-details", json!({ "name": "Jane" }))
                .unwrap();
            store.set_note("D1", "beside triage").unwrap();
            store.set_user(Some("medic-7".into())).unwrap();
        }

        let store = DocumentStore::new(Persistence::disk(dir.path(), "state.json"));
        store.init().unwrap();

        let document = store.load("D1").unwrap();
        assert_eq!(
            document.sections["patient-details"],
            json!({ "name": "Jane" })
        );
        assert_eq!(document.complete["patient-details"], true);
        assert_eq!(store.note("D1").unwrap().as_deref(), Some("beside triage"));
        assert_eq!(store.user().unwrap().as_deref(), Some("medic-7"));
    }

    #[test]
    fn completeness_flags_recomputed_on_init_match_stored() {
        let dir = tempfile::tempdir().unwrap();
        let flags_before;

        {
            let store = DocumentStore::new(Persistence::disk(dir.path(), "state.json"));
            store.create("D1", TemplateKey::Prf).unwrap();
            store
                .write_section(
                    "D1",
                    "vital-signs",
                    json!({ "pulse": 90, "respiration-rate": 18 }),
                )
                .unwrap();
            flags_before = store.load("D1").unwrap().complete;
        }

        let store = DocumentStore::new(Persistence::disk(dir.path(), "state.json"));
        store.init().unwrap();
        assert_eq!(store.load("D1").unwrap().complete, flags_before);
    }

    #[test]
    fn clear_all_also_wipes_the_blob() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = DocumentStore::new(Persistence::disk(dir.path(), "state.json"));
            store.create("D1", TemplateKey::Prf).unwrap();
            store.clear_all().unwrap();
        }

        let store = DocumentStore::new(Persistence::disk(dir.path(), "state.json"));
        store.init().unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Notes slice
    // -----------------------------------------------------------------------

    #[test]
    fn notes_have_independent_lifecycle() {
        let store = store_with_draft("D1");
        store
            .write_section("D1", "patient-details", json!({ "name": "Jane" }))
            .unwrap();
        let before = store.load("D1").unwrap();

        store.set_note("D1", "ETA 10 minutes").unwrap();
        assert_eq!(store.note("D1").unwrap().as_deref(), Some("ETA 10 minutes"));

        store.clear_note("D1").unwrap();
        assert!(store.note("D1").unwrap().is_none());
        assert_eq!(store.load("D1").unwrap(), before);
    }

    // -----------------------------------------------------------------------
    // Sync bookkeeping
    // -----------------------------------------------------------------------

    #[test]
    fn pending_documents_oldest_first() {
        let store = DocumentStore::in_memory();
        store.create("first", TemplateKey::Prf).unwrap();
        store
            .write_section("first", "notes", json!({ "narrative": "a" }))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.create("second", TemplateKey::Prf).unwrap();
        store
            .write_section("second", "notes", json!({ "narrative": "b" }))
            .unwrap();

        store.mark_pending("second").unwrap();
        store.mark_pending("first").unwrap();

        assert_eq!(store.pending_documents().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn mark_synced_finalizes_sealed_documents() {
        let store = store_with_draft("D1");
        store.seal("D1").unwrap();
        let finalized = store.mark_synced("D1").unwrap();
        assert!(finalized);
        assert!(matches!(store.load("D1"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn mark_synced_clears_pending_flag() {
        let store = store_with_draft("D1");
        store.mark_pending("D1").unwrap();
        let finalized = store.mark_synced("D1").unwrap();
        assert!(!finalized);

        let document = store.load("D1").unwrap();
        assert!(!document.pending_sync);
        assert_eq!(document.status, DocumentStatus::Synced);
        assert!(store.pending_documents().unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    #[test]
    fn write_wakes_only_that_sections_watcher() {
        let store = store_with_draft("D1");
        let mut vitals = store.subscribe("D1", "vital-signs");
        let mut notes = store.subscribe("D1", "notes");
        vitals.borrow_and_update();
        notes.borrow_and_update();

        store
            .write_section("D1", "vital-signs", json!({ "pulse": 72 }))
            .unwrap();

        assert!(vitals.has_changed().unwrap());
        assert!(!notes.has_changed().unwrap());
    }

    #[test]
    fn adopt_wakes_every_section_watcher() {
        let store = store_with_draft("D1");
        let mut vitals = store.subscribe("D1", "vital-signs");
        vitals.borrow_and_update();

        let mut document = store.load("D1").unwrap();
        document
            .sections
            .insert("vital-signs".into(), json!({ "pulse": 64 }));
        store.adopt(document).unwrap();

        assert!(vitals.has_changed().unwrap());
    }

    #[test]
    fn failed_write_does_not_wake_watchers() {
        let store = store_with_draft("D1");
        let mut vitals = store.subscribe("D1", "vital-signs");
        vitals.borrow_and_update();

        let _ = store.write_section("D1", "vital-signs", json!({ "pulse": "fast" }));
        assert!(!vitals.has_changed().unwrap());
    }
}

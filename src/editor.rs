//! The section editor contract.
//!
//! One generic editor replaces a page of near-identical per-section editors:
//! a concrete section supplies only its field layout, while persistence,
//! validation and stepper wiring live here. An editor is bound to exactly
//! one (document, section) pair at construction and can reach no other
//! slice, which is what enforces the store's single-writer-per-section
//! convention without any runtime lock.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use crate::models::template::SectionDescriptor;
use crate::navigator::Navigator;
use crate::store::{DocumentStore, StoreError};

pub struct SectionEditor {
    store: Arc<DocumentStore>,
    navigator: Arc<Navigator>,
    document_id: String,
    section_key: String,
    descriptor: SectionDescriptor,
}

impl SectionEditor {
    /// Bind an editor to its slice. Refuses unknown sections up front, so a
    /// mounted editor can always resolve its descriptor.
    pub fn bind(
        store: Arc<DocumentStore>,
        navigator: Arc<Navigator>,
        document_id: &str,
        section_key: &str,
    ) -> Result<Self, StoreError> {
        let registry = store.registry_for(document_id)?;
        let descriptor = registry
            .resolve(section_key)
            .cloned()
            .ok_or_else(|| StoreError::UnknownSection {
                document: document_id.to_string(),
                section: section_key.to_string(),
            })?;
        Ok(Self {
            store,
            navigator,
            document_id: document_id.to_string(),
            section_key: section_key.to_string(),
            descriptor,
        })
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn section_key(&self) -> &str {
        &self.section_key
    }

    pub fn descriptor(&self) -> &SectionDescriptor {
        &self.descriptor
    }

    /// This editor's slice of the document, if anything was written yet.
    pub fn read(&self) -> Result<Option<Value>, StoreError> {
        let document = self.store.load(&self.document_id)?;
        Ok(document.sections.get(&self.section_key).cloned())
    }

    /// Write through the store and report the outcome to the stepper.
    pub fn write(&self, value: Value) -> Result<(), StoreError> {
        match self
            .store
            .write_section(&self.document_id, &self.section_key, value)
        {
            Ok(complete) => {
                self.navigator
                    .record_success(&self.document_id, &self.section_key, complete);
                Ok(())
            }
            Err(error) => {
                if matches!(error, StoreError::Validation(_)) {
                    self.navigator
                        .record_invalid(&self.document_id, &self.section_key);
                }
                Err(error)
            }
        }
    }

    pub fn is_complete(&self) -> Result<bool, StoreError> {
        self.store
            .section_complete(&self.document_id, &self.section_key)
    }

    /// Change channel for exactly this section; writes elsewhere never wake
    /// it.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.store.subscribe(&self.document_id, &self.section_key)
    }
}

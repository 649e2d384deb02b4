use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::registry::SchemaRegistry;

use super::template::TemplateKey;

/// Document-level lifecycle status.
///
/// `Synced` on an in-store document means "saved, no local edits since";
/// a later write moves it back to `Dirty`. `Submitted` seals the document:
/// no further section writes, only the final save may act on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Submitted,
    Synced,
    Dirty,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Submitted => "submitted",
            DocumentStatus::Synced => "synced",
            DocumentStatus::Dirty => "dirty",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(DocumentStatus::Draft),
            "submitted" => Some(DocumentStatus::Submitted),
            "synced" => Some(DocumentStatus::Synced),
            "dirty" => Some(DocumentStatus::Dirty),
            _ => None,
        }
    }
}

/// A section-based document: one PRF or one dynamic-form response.
///
/// Section values are arbitrary JSON objects conforming to the governing
/// registry's schema for that key. Keys not known to the registry may only
/// exist when flagged `orphaned` (carried over from an older template
/// version); they are preserved on save and hidden from navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(rename = "templateKey")]
    pub template_key: TemplateKey,
    #[serde(default)]
    pub sections: BTreeMap<String, Value>,
    #[serde(default)]
    pub complete: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub orphaned: BTreeSet<String>,
    pub status: DocumentStatus,
    #[serde(rename = "lastModified")]
    pub last_modified: DateTime<Utc>,
    #[serde(
        rename = "sectionModified",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub section_modified: BTreeMap<String, DateTime<Utc>>,
    #[serde(rename = "pendingSync", default)]
    pub pending_sync: bool,
}

impl Document {
    /// A fresh draft with every section untouched.
    pub fn new(id: impl Into<String>, template_key: TemplateKey) -> Self {
        Self {
            id: id.into(),
            template_key,
            sections: BTreeMap::new(),
            complete: BTreeMap::new(),
            orphaned: BTreeSet::new(),
            status: DocumentStatus::Draft,
            last_modified: Utc::now(),
            section_modified: BTreeMap::new(),
            pending_sync: false,
        }
    }

    /// Final submission has started; section writes are refused.
    pub fn is_sealed(&self) -> bool {
        matches!(self.status, DocumentStatus::Submitted)
    }

    /// Recompute every completeness flag from the section values.
    ///
    /// Flags are stored in the persisted blob but the registry is the
    /// authority; load paths call this and keep the recomputed values.
    pub fn recompute_complete(&mut self, registry: &SchemaRegistry) {
        self.complete.clear();
        for descriptor in registry.describe() {
            let flag = self
                .sections
                .get(&descriptor.key)
                .map(|value| descriptor.schema.is_complete(value))
                .unwrap_or(false);
            self.complete.insert(descriptor.key.clone(), flag);
        }
    }

    /// Recompute one section's flag; returns the new value.
    pub fn recompute_section(&mut self, registry: &SchemaRegistry, section_key: &str) -> bool {
        let flag = registry
            .resolve(section_key)
            .and_then(|descriptor| {
                self.sections
                    .get(section_key)
                    .map(|value| descriptor.schema.is_complete(value))
            })
            .unwrap_or(false);
        self.complete.insert(section_key.to_string(), flag);
        flag
    }

    /// Stamp a section write: timestamps plus the synced → dirty transition.
    pub fn mark_modified(&mut self, section_key: &str) {
        let now = Utc::now();
        self.last_modified = now;
        self.section_modified.insert(section_key.to_string(), now);
        if self.status == DocumentStatus::Synced {
            self.status = DocumentStatus::Dirty;
        }
    }

    /// True when every registry section's completeness flag is set.
    pub fn all_sections_complete(&self, registry: &SchemaRegistry) -> bool {
        registry
            .describe()
            .iter()
            .all(|descriptor| self.complete.get(&descriptor.key).copied().unwrap_or(false))
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            status: self.status,
            last_modified: self.last_modified,
            sections_complete: self.complete.values().filter(|flag| **flag).count(),
            sections_total: self.complete.len(),
            pending_sync: self.pending_sync,
        }
    }
}

/// Dashboard row for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub status: DocumentStatus,
    #[serde(rename = "lastModified")]
    pub last_modified: DateTime<Utc>,
    pub sections_complete: usize,
    pub sections_total: usize,
    #[serde(rename = "pendingSync")]
    pub pending_sync: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn new_document_is_an_untouched_draft() {
        let document = Document::new("D1", TemplateKey::Prf);
        assert_eq!(document.status, DocumentStatus::Draft);
        assert!(document.sections.is_empty());
        assert!(!document.is_sealed());
        assert!(!document.pending_sync);
    }

    #[test]
    fn recompute_complete_covers_every_registry_section() {
        let registry = SchemaRegistry::prf();
        let mut document = Document::new("D1", TemplateKey::Prf);
        document.recompute_complete(&registry);

        assert_eq!(document.complete.len(), 14);
        assert!(document.complete.values().all(|flag| !flag));

        document
            .sections
            .insert("patient-details".into(), json!({ "name": "Jane" }));
        document.recompute_complete(&registry);
        assert_eq!(document.complete["patient-details"], true);
        assert_eq!(document.complete["vital-signs"], false);
    }

    #[test]
    fn mark_modified_dirties_a_synced_document() {
        let mut document = Document::new("D1", TemplateKey::Prf);
        document.status = DocumentStatus::Synced;
        let before = document.last_modified;

        document.mark_modified("vital-signs");
        assert_eq!(document.status, DocumentStatus::Dirty);
        assert!(document.last_modified >= before);
        assert!(document.section_modified.contains_key("vital-signs"));
    }

    #[test]
    fn mark_modified_leaves_a_draft_as_draft() {
        let mut document = Document::new("D1", TemplateKey::Prf);
        document.mark_modified("notes");
        assert_eq!(document.status, DocumentStatus::Draft);
    }

    #[test]
    fn submitted_document_is_sealed() {
        let mut document = Document::new("D1", TemplateKey::Prf);
        document.status = DocumentStatus::Submitted;
        assert!(document.is_sealed());
    }

    #[test]
    fn summary_counts_complete_sections() {
        let registry = SchemaRegistry::prf();
        let mut document = Document::new("D1", TemplateKey::Prf);
        document
            .sections
            .insert("patient-details".into(), json!({ "name": "Jane" }));
        document.recompute_complete(&registry);

        let summary = document.summary();
        assert_eq!(summary.sections_complete, 1);
        assert_eq!(summary.sections_total, 14);
        assert_eq!(summary.status, DocumentStatus::Draft);
    }

    #[test]
    fn wire_field_names_preserved() {
        let document = Document::new("D1", TemplateKey::Prf);
        let value = serde_json::to_value(&document).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("lastModified"));
        assert!(object.contains_key("templateKey"));
        assert!(object.contains_key("pendingSync"));
    }

    #[test]
    fn status_as_str_round_trips() {
        for status in [
            DocumentStatus::Draft,
            DocumentStatus::Submitted,
            DocumentStatus::Synced,
            DocumentStatus::Dirty,
        ] {
            assert_eq!(DocumentStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::from_str("archived"), None);
    }

    #[test]
    fn document_round_trips_through_serde() {
        let registry = SchemaRegistry::prf();
        let mut document = Document::new("D1", TemplateKey::Prf);
        document.sections.insert(
            "vital-signs".into(),
            json!({ "pulse": 88, "respiration-rate": 14 }),
        );
        document.mark_modified("vital-signs");
        document.recompute_complete(&registry);

        let json = serde_json::to_string(&document).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(document, back);
    }
}

use serde::{Deserialize, Serialize};

use super::document::{Document, DocumentStatus};

/// Submission status of a dynamic-form response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    InProgress,
    Submitted,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::InProgress => "in_progress",
            SubmissionStatus::Submitted => "submitted",
        }
    }
}

/// A document bound to a specific template version, as stored remotely.
///
/// The same envelope carries legacy PRF records (template id `prf`) and
/// dynamic-form responses; only the template binding differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(rename = "templateId")]
    pub template_id: String,
    #[serde(rename = "templateVersion")]
    pub template_version: u32,
    pub document: Document,
    pub status: SubmissionStatus,
    pub owner: String,
}

impl Response {
    /// Wrap a local document for a remote save on behalf of `owner`.
    pub fn from_document(document: &Document, owner: &str) -> Self {
        let status = match document.status {
            DocumentStatus::Submitted | DocumentStatus::Synced => SubmissionStatus::Submitted,
            DocumentStatus::Draft | DocumentStatus::Dirty => SubmissionStatus::InProgress,
        };
        Self {
            id: document.id.clone(),
            template_id: document.template_key.template_id().to_string(),
            template_version: document.template_key.version(),
            document: document.clone(),
            status,
            owner: owner.to_string(),
        }
    }
}

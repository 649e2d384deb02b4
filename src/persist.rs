//! Durable storage of the engine's state blob.
//!
//! One JSON blob per storage name, shaped `{ user, documents,
//! notesByDocumentId }`. Writes go through a temp file in the same
//! directory and an atomic rename, so a torn write can never destroy the
//! previous good blob. A blob that fails to parse is quarantined under a
//! `.corrupt` suffix rather than deleted.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::document::Document;

/// Everything the engine persists between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub user: Option<String>,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(rename = "notesByDocumentId", default)]
    pub notes_by_document_id: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Where the blob lives: on disk, or in memory for tests and ephemeral runs.
pub enum Persistence {
    Disk { dir: PathBuf, name: String },
    Memory(Mutex<Option<Vec<u8>>>),
}

impl Persistence {
    pub fn disk(dir: impl Into<PathBuf>, name: &str) -> Self {
        Persistence::Disk {
            dir: dir.into(),
            name: name.to_string(),
        }
    }

    /// Blob under the default application data directory.
    pub fn at_default_location() -> Self {
        Self::disk(crate::config::app_data_dir(), crate::config::STORAGE_NAME)
    }

    pub fn in_memory() -> Self {
        Persistence::Memory(Mutex::new(None))
    }

    fn blob_path(dir: &PathBuf, name: &str) -> PathBuf {
        dir.join(name)
    }

    /// Serialize and durably replace the blob.
    pub fn save(&self, state: &PersistedState) -> Result<(), PersistError> {
        match self {
            Persistence::Memory(slot) => {
                let bytes = serde_json::to_vec(state)?;
                if let Ok(mut guard) = slot.lock() {
                    *guard = Some(bytes);
                }
                Ok(())
            }
            Persistence::Disk { dir, name } => {
                fs::create_dir_all(dir)?;
                let bytes = serde_json::to_vec_pretty(state)?;
                let mut tmp = tempfile::Builder::new()
                    .prefix(".prf-state")
                    .suffix(".tmp")
                    .tempfile_in(dir)?;
                tmp.write_all(&bytes)?;
                tmp.as_file().sync_all()?;
                tmp.persist(Self::blob_path(dir, name))
                    .map_err(|e| PersistError::Io(e.error))?;
                tracing::debug!(bytes = bytes.len(), "persisted state blob");
                Ok(())
            }
        }
    }

    /// Load the blob. Absent means a fresh state; corrupt means quarantine.
    pub fn load(&self) -> Result<Option<PersistedState>, PersistError> {
        match self {
            Persistence::Memory(slot) => {
                let guard = slot.lock().ok();
                let Some(bytes) = guard.as_ref().and_then(|g| g.as_ref().cloned()) else {
                    return Ok(None);
                };
                match serde_json::from_slice(&bytes) {
                    Ok(state) => Ok(Some(state)),
                    Err(e) => {
                        tracing::warn!(error = %e, "in-memory state blob corrupt, starting fresh");
                        Ok(None)
                    }
                }
            }
            Persistence::Disk { dir, name } => {
                let path = Self::blob_path(dir, name);
                let bytes = match fs::read(&path) {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                match serde_json::from_slice(&bytes) {
                    Ok(state) => Ok(Some(state)),
                    Err(e) => {
                        let quarantine = path.with_extension("json.corrupt");
                        tracing::warn!(
                            error = %e,
                            quarantine = %quarantine.display(),
                            "state blob corrupt, quarantining and starting fresh"
                        );
                        fs::rename(&path, &quarantine)?;
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Remove temp files left behind by a crash mid-save.
    ///
    /// Returns how many were removed. The live blob is never touched.
    pub fn cleanup_stale_temps(&self) -> usize {
        let Persistence::Disk { dir, .. } = self else {
            return 0;
        };
        let Ok(entries) = fs::read_dir(dir) else {
            return 0;
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if name.starts_with(".prf-state") && name.ends_with(".tmp") {
                if fs::remove_file(entry.path()).is_ok() {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, "cleaned up stale temp files");
        }
        removed
    }
}

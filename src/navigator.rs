//! Stepper over a document's sections.
//!
//! Tracks which sections exist for a document, their editing state, the
//! cursor, and the aggregate submit gate. Navigation is never blocked —
//! crews visit sections out of order — which is why every section carries
//! its own state instead of a single linear progress counter.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::store::{DocumentStore, StoreError};

/// Editing state of one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionState {
    Untouched,
    InProgress,
    Complete,
    Invalid,
}

impl SectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SectionState::Untouched => "untouched",
            SectionState::InProgress => "in_progress",
            SectionState::Complete => "complete",
            SectionState::Invalid => "invalid",
        }
    }
}

/// Result of a navigation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Section(String),
    /// Past either end of the section list.
    End,
}

/// Aggregate completion for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub complete: usize,
    pub total: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum NavError {
    #[error("document not tracked: {0}")]
    UnknownDocument(String),
    #[error("unknown section '{0}'")]
    UnknownSection(String),
    #[error("internal lock error")]
    LockPoisoned,
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct DocNav {
    cursor: Option<String>,
    sections: BTreeMap<String, SectionState>,
}

/// Per-document stepper state, seeded from the store and driven by section
/// editors reporting write outcomes.
pub struct Navigator {
    store: Arc<DocumentStore>,
    state: RwLock<BTreeMap<String, DocNav>>,
}

impl Navigator {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self {
            store,
            state: RwLock::new(BTreeMap::new()),
        }
    }

    /// Begin (or re-seed) tracking for a stored document.
    ///
    /// Section states are derived from what the store holds: complete flag
    /// set → `Complete`, value present → `InProgress`, absent → `Untouched`.
    /// Orphaned sections are invisible here.
    pub fn track(&self, document_id: &str) -> Result<(), NavError> {
        let document = self.store.load(document_id)?;
        let registry = self.store.registry_for(document_id)?;

        let mut sections = BTreeMap::new();
        for descriptor in registry.describe() {
            let state = if document.complete.get(&descriptor.key).copied().unwrap_or(false) {
                SectionState::Complete
            } else if document.sections.contains_key(&descriptor.key) {
                SectionState::InProgress
            } else {
                SectionState::Untouched
            };
            sections.insert(descriptor.key.clone(), state);
        }

        let cursor = registry.describe().first().map(|d| d.key.clone());
        let mut state = self.write_state()?;
        state.insert(document_id.to_string(), DocNav { cursor, sections });
        Ok(())
    }

    /// Stop tracking (route left, document removed).
    pub fn untrack(&self, document_id: &str) {
        if let Ok(mut state) = self.state.write() {
            state.remove(document_id);
        }
    }

    // ── Editor-reported transitions ─────────────────────────

    /// A write committed; `complete` is the store's new flag.
    pub fn record_success(&self, document_id: &str, section_key: &str, complete: bool) {
        let next = if complete {
            SectionState::Complete
        } else {
            SectionState::InProgress
        };
        self.set_state(document_id, section_key, next);
    }

    /// A write failed validation; the section shows as invalid even though
    /// the stored value is unchanged.
    pub fn record_invalid(&self, document_id: &str, section_key: &str) {
        self.set_state(document_id, section_key, SectionState::Invalid);
    }

    fn set_state(&self, document_id: &str, section_key: &str, next: SectionState) {
        let Ok(mut state) = self.state.write() else {
            return;
        };
        if let Some(nav) = state.get_mut(document_id) {
            if let Some(section) = nav.sections.get_mut(section_key) {
                *section = next;
            }
        }
    }

    pub fn section_state(&self, document_id: &str, section_key: &str) -> Option<SectionState> {
        self.state
            .read()
            .ok()?
            .get(document_id)?
            .sections
            .get(section_key)
            .copied()
    }

    // ── Navigation ──────────────────────────────────────────

    pub fn next(&self, document_id: &str, current_key: &str) -> Result<Step, NavError> {
        self.step(document_id, current_key, 1)
    }

    pub fn prev(&self, document_id: &str, current_key: &str) -> Result<Step, NavError> {
        self.step(document_id, current_key, -1)
    }

    fn step(&self, document_id: &str, current_key: &str, direction: i64) -> Result<Step, NavError> {
        self.ensure_tracked(document_id)?;
        let registry = self.store.registry_for(document_id)?;
        let keys: Vec<&str> = registry.describe().iter().map(|d| d.key.as_str()).collect();
        let position = keys
            .iter()
            .position(|k| *k == current_key)
            .ok_or_else(|| NavError::UnknownSection(current_key.to_string()))?;

        let target = position as i64 + direction;
        if target < 0 || target >= keys.len() as i64 {
            return Ok(Step::End);
        }
        let key = keys[target as usize].to_string();
        self.set_cursor(document_id, &key);
        Ok(Step::Section(key))
    }

    /// Jump anywhere, unconditionally — visiting out of order is expected.
    pub fn jump_to(&self, document_id: &str, section_key: &str) -> Result<(), NavError> {
        self.ensure_tracked(document_id)?;
        let registry = self.store.registry_for(document_id)?;
        if !registry.contains(section_key) {
            return Err(NavError::UnknownSection(section_key.to_string()));
        }
        self.set_cursor(document_id, section_key);
        Ok(())
    }

    pub fn current(&self, document_id: &str) -> Option<String> {
        self.state
            .read()
            .ok()?
            .get(document_id)?
            .cursor
            .clone()
    }

    fn set_cursor(&self, document_id: &str, section_key: &str) {
        if let Ok(mut state) = self.state.write() {
            if let Some(nav) = state.get_mut(document_id) {
                nav.cursor = Some(section_key.to_string());
            }
        }
    }

    // ── Aggregates ──────────────────────────────────────────

    /// True only when every tracked section is complete. Navigation itself
    /// is never gated on this.
    pub fn can_submit(&self, document_id: &str) -> bool {
        self.state
            .read()
            .ok()
            .and_then(|state| {
                state.get(document_id).map(|nav| {
                    !nav.sections.is_empty()
                        && nav
                            .sections
                            .values()
                            .all(|s| *s == SectionState::Complete)
                })
            })
            .unwrap_or(false)
    }

    pub fn progress(&self, document_id: &str) -> Progress {
        self.state
            .read()
            .ok()
            .and_then(|state| {
                state.get(document_id).map(|nav| Progress {
                    complete: nav
                        .sections
                        .values()
                        .filter(|s| **s == SectionState::Complete)
                        .count(),
                    total: nav.sections.len(),
                })
            })
            .unwrap_or(Progress {
                complete: 0,
                total: 0,
            })
    }

    fn ensure_tracked(&self, document_id: &str) -> Result<(), NavError> {
        let tracked = self
            .state
            .read()
            .map_err(|_| NavError::LockPoisoned)?
            .contains_key(document_id);
        if tracked {
            Ok(())
        } else {
            // Auto-track stored documents so navigation works right after a
            // reconcile without an explicit track() call.
            self.track(document_id)
        }
    }

    fn write_state(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, DocNav>>, NavError> {
        self.state.write().map_err(|_| NavError::LockPoisoned)
    }
}

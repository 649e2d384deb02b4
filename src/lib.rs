//! Section-based document state engine for Patient Report Forms.
//!
//! A PRF is one logical document composed through many independently
//! navigable sections. This crate owns the in-memory and persisted document
//! state, per-section validation, stepper navigation, template ↔ response
//! reconciliation, and best-effort remote sync with a local-durability
//! fallback. Rendering, routing, auth, and push delivery live elsewhere and
//! talk to the engine through the types exposed here.

pub mod config;
pub mod editor; // Section editor contract: one editor, one slice
pub mod gateway; // Remote save/list with offline fallback
pub mod models;
pub mod navigator; // Stepper over section descriptors
pub mod persist; // State blob with atomic writes
pub mod reconcile; // Template ↔ response merge
pub mod schema; // Section schemas and registries
pub mod store; // Single source of truth for documents

use tracing_subscriber::EnvFilter;

/// Initialize tracing for binaries and tests embedding the engine.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}

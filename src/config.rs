use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "prf-engine";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the persisted state blob.
pub const STORAGE_NAME: &str = "prf-store.json";

/// Upper bound on any single remote call before degrading to local-only.
pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Get the application data directory
/// ~/.prf-engine/ on all platforms
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(".prf-engine")
}

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("info,{}=debug", env!("CARGO_PKG_NAME").replace('-', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with(".prf-engine"));
    }

    #[test]
    fn app_version_is_set() {
        assert!(!APP_VERSION.is_empty());
    }

    #[test]
    fn default_log_filter_targets_this_crate() {
        assert!(default_log_filter().contains("prf_engine=debug"));
    }
}

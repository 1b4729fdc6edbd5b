//! Built-in defaults (lowest configuration layer)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Hardcoded defaults for every configuration value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Directory holding the cache roots (default: `$HOME/.gradle/caches`)
    pub caches_dir: PathBuf,

    /// Scan threads per cache root (default: 1)
    pub workers: usize,

    /// Seconds a scan may run before the pool stops claiming (default: 60)
    pub shutdown_timeout_seconds: u64,

    /// Seconds to wait for a contended lock, 0 = forever (default: 0)
    pub lock_timeout_seconds: u64,

    /// Name length of jar cache entries (default: 32)
    pub cache_key_length: usize,

    /// Plan without deleting (default: false)
    pub dry_run: bool,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self {
            caches_dir: PathBuf::from(home).join(".gradle").join("caches"),
            workers: 1,
            shutdown_timeout_seconds: 60,
            lock_timeout_seconds: 0,
            cache_key_length: sweep_engine::DEFAULT_CACHE_KEY_LENGTH,
            dry_run: false,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to a JSON value for merging.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "caches_dir": self.caches_dir,
            "journal_path": null,
            "workers": self.workers,
            "shutdown_timeout_seconds": self.shutdown_timeout_seconds,
            "lock_timeout_seconds": self.lock_timeout_seconds,
            "cache_key_length": self.cache_key_length,
            "dry_run": self.dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert!(defaults.caches_dir.ends_with(".gradle/caches"));
        assert_eq!(defaults.workers, 1);
        assert_eq!(defaults.shutdown_timeout_seconds, 60);
        assert_eq!(defaults.lock_timeout_seconds, 0);
        assert_eq!(defaults.cache_key_length, 32);
        assert!(!defaults.dry_run);
    }

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();
        assert_eq!(value["workers"], 1);
        assert_eq!(value["cache_key_length"], 32);
        assert!(value["journal_path"].is_null());
    }
}

//! Effective configuration with provenance
//!
//! The effective config is the merge of built-in defaults, an optional TOML
//! file and CLI overrides, together with a record of which sources
//! contributed (and the SHA-256 of each file) so a sweep report can say
//! exactly what settings produced it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;

/// File name of the journal, relative to the caches directory.
pub const DEFAULT_JOURNAL_RELATIVE: &str = "journal-1/file-access.json";

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing config source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Resolved sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    pub caches_dir: PathBuf,
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
    pub workers: usize,
    pub shutdown_timeout_seconds: u64,
    pub lock_timeout_seconds: u64,
    pub cache_key_length: usize,
    pub dry_run: bool,
}

impl SweepConfig {
    /// Journal location, defaulting to a file under the caches directory.
    pub fn journal_path(&self) -> PathBuf {
        self.journal_path
            .clone()
            .unwrap_or_else(|| self.caches_dir.join(DEFAULT_JOURNAL_RELATIVE))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// `None` means wait for contended locks indefinitely.
    pub fn lock_timeout(&self) -> Option<Duration> {
        (self.lock_timeout_seconds > 0).then(|| Duration::from_secs(self.lock_timeout_seconds))
    }
}

/// Merged configuration plus the sources it came from.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub config: SweepConfig,
    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Build the effective config from defaults, an optional file and CLI overrides.
    ///
    /// A `config_path` that does not exist is skipped.
    pub fn build(config_path: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = config_path {
            if path.exists() {
                let (value, digest) = Self::load_toml_file(path)?;
                layers.push(value);
                sources.push(ConfigSource {
                    origin: ConfigOrigin::File,
                    path: Some(path.to_string_lossy().to_string()),
                    digest: Some(digest),
                });
            }
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let config: SweepConfig = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ParseError(format!("invalid configuration: {}", e)))?;
        Self::validate(&config)?;

        Ok(Self { config, sources })
    }

    /// Default location of the optional config file.
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var("HOME").ok()?;
        Some(PathBuf::from(home).join(".config/cache-sweep/config.toml"))
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path).map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        let json_value = serde_json::to_value(toml_value)
            .map_err(|e| ConfigError::ParseError(format!("TOML conversion error: {}", e)))?;
        Ok((json_value, digest))
    }

    fn validate(config: &SweepConfig) -> Result<(), ConfigError> {
        if config.workers == 0 {
            return Err(ConfigError::ValidationError(
                "workers must be at least 1".to_string(),
            ));
        }
        if config.cache_key_length == 0 {
            return Err(ConfigError::ValidationError(
                "cache_key_length must be at least 1".to_string(),
            ));
        }
        if config.shutdown_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "shutdown_timeout_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

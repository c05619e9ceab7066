//! revsweep.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_MANIFEST_KEY: &str = "manifest.json";
pub const DEFAULT_LIVE_POINTER_KEY: &str = "latest.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_format: LogFormat,
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub cleanup: CleanupConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Fully-qualified id of the service whose routing is pruned.
    pub service_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bucket holding the manifest and per-version metadata files.
    pub bucket: String,
    pub manifest_key: String,
    pub live_pointer_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            manifest_key: DEFAULT_MANIFEST_KEY.to_string(),
            live_pointer_key: DEFAULT_LIVE_POINTER_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Keep count used when a caller does not supply one.
    pub default_keep: u32,
    /// Maximum blocking remote calls in flight per engine.
    pub workers: usize,
    /// Maximum concurrent metadata deletes.
    pub delete_concurrency: usize,
    /// Upper bound for a whole cleanup run.
    pub timeout_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            default_keep: 5,
            workers: 8,
            delete_concurrency: 8,
            timeout_secs: 120,
        }
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cleanup.default_keep == 0 {
            return Err(ConfigError::Invalid("cleanup.default_keep must be at least 1".into()));
        }
        if self.cleanup.workers == 0 || self.cleanup.delete_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "cleanup.workers and cleanup.delete_concurrency must be at least 1".into(),
            ));
        }
        if self.storage.manifest_key.is_empty() || self.storage.live_pointer_key.is_empty() {
            return Err(ConfigError::Invalid("reserved storage keys must not be empty".into()));
        }
        Ok(())
    }

    /// Cleanup needs both a service to prune and a bucket to collect.
    pub fn cleanup_enabled(&self) -> bool {
        !self.service.service_id.is_empty() && !self.storage.bucket.is_empty()
    }
}

//! Error types shared by the collaborator contracts.

use thiserror::Error;

/// Failure of an object-storage call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Failure of a routing-platform call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("revision not found: {0}")]
    RevisionNotFound(String),

    #[error("routing backend error: {0}")]
    Backend(String),
}

/// Caller input rejected before the engine is entered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("keep count must be at least 1, got {0}")]
    KeepCount(i64),

    #[error("keep count must be at most {max}, got {0}", max = u32::MAX)]
    KeepCountTooLarge(i64),

    #[error("deployment revision must not be empty")]
    EmptyRevision,

    #[error("unknown country: {0}")]
    Country(String),
}

/// Failure to load `revsweep.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

//! Error types for cleanup steps.
//!
//! Every remote step has its own variant so that the rendered message names
//! the operation and the object or service involved. The orchestrator turns
//! these into strings on the report; nothing here reaches the caller as a
//! failure.

use revsweep_core::{RoutingError, StoreError};
use thiserror::Error;

/// Failure of the blocking-call offload itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OffloadError {
    #[error("blocking worker failed: {0}")]
    Join(String),

    #[error("worker pool closed")]
    Closed,
}

/// Failure of one remote step of a cleanup run.
#[derive(Debug, Clone, Error)]
pub enum CleanupError {
    #[error("failed to read manifest {key}: {source}")]
    ManifestRead { key: String, source: StoreError },

    #[error("failed to decode manifest {key}: {reason}")]
    ManifestDecode { key: String, reason: String },

    #[error("failed to encode manifest: {0}")]
    ManifestEncode(String),

    #[error("failed to write manifest {key}: {source}")]
    ManifestWrite { key: String, source: StoreError },

    #[error("failed to get routing config for {service}: {source}")]
    RoutingFetch {
        service: String,
        source: RoutingError,
    },

    #[error("failed to update routing config for {service}: {source}")]
    RoutingUpdate {
        service: String,
        source: RoutingError,
    },

    #[error("failed to list revisions for {service}: {source}")]
    RevisionList {
        service: String,
        source: RoutingError,
    },

    #[error("failed to delete revision {revision}: {source}")]
    RevisionDelete {
        revision: String,
        source: RoutingError,
    },

    #[error("failed to list metadata files: {0}")]
    MetadataList(StoreError),

    #[error("failed to read metadata file {key}: {source}")]
    MetadataRead { key: String, source: StoreError },

    #[error("failed to write metadata file {key}: {source}")]
    MetadataWrite { key: String, source: StoreError },

    #[error("failed to delete metadata file {key}: {source}")]
    MetadataDelete { key: String, source: StoreError },

    #[error(transparent)]
    Offload(#[from] OffloadError),
}

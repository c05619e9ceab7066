//! Error types for the embedded state store.

use revsweep_core::{RoutingError, StoreError};
use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StateError> for StoreError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(key) => StoreError::NotFound(key),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<StateError> for RoutingError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(service) => RoutingError::ServiceNotFound(service),
            other => RoutingError::Backend(other.to_string()),
        }
    }
}

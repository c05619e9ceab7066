//! Collaborator contracts the cleanup engine is written against.
//!
//! Both traits are blocking: implementations may perform network or disk
//! I/O on the calling thread. The engine never calls them from an async
//! context directly; it offloads each call to a worker.

use crate::error::{RoutingError, StoreError};
use crate::types::{RevisionRecord, RoutingConfig, RoutingEntry};

/// Flat namespace of small objects (one bucket).
pub trait ObjectStore: Send + Sync + 'static {
    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Fetch an object. Missing objects yield [`StoreError::NotFound`].
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Delete an object. Deleting a missing object is an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Server-side copy. Readers of `dst` observe either the old or the
    /// new object in full, never a mix.
    fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError>;

    /// Keys starting with `prefix`, in lexical order.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Routing control of the compute platform.
pub trait RoutingPlatform: Send + Sync + 'static {
    fn get_routing_config(&self, service_id: &str) -> Result<RoutingConfig, RoutingError>;

    /// Replace the service's entry list in a single update.
    fn update_routing_config(
        &self,
        service_id: &str,
        entries: Vec<RoutingEntry>,
    ) -> Result<(), RoutingError>;

    /// Revisions that currently exist for the service.
    fn list_revisions(&self, service_id: &str) -> Result<Vec<RevisionRecord>, RoutingError>;

    /// Delete a revision by the name [`list_revisions`](Self::list_revisions)
    /// reported. Deleting a missing revision is
    /// [`RoutingError::RevisionNotFound`].
    fn delete_revision(&self, service_id: &str, name: &str) -> Result<(), RoutingError>;
}

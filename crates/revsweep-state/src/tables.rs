//! redb table definitions for the embedded state store.
//!
//! Each table uses `&str` keys and `&[u8]` values.

use redb::TableDefinition;

/// Raw object bytes keyed by `{bucket}/{key}`.
pub const OBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");

/// JSON `RoutingConfig` keyed by `{service_id}`.
pub const ROUTING: TableDefinition<&str, &[u8]> = TableDefinition::new("routing");

/// JSON `RevisionRecord` keyed by `{service_id}|{revision}`.
pub const REVISIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("revisions");

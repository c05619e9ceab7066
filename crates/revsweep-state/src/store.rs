//! StateStore: redb-backed persistence for objects and routing.
//!
//! Provides raw object operations (used through [`Bucket`]) and typed
//! routing/revision records. The store supports both on-disk and in-memory
//! backends (the latter for testing and local dry runs).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use revsweep_core::{RevisionRecord, RoutingConfig, RoutingEntry, RoutingError, RoutingPlatform};
use tracing::debug;

use crate::bucket::Bucket;
use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(OBJECTS).map_err(map_err!(Table))?;
        txn.open_table(ROUTING).map_err(map_err!(Table))?;
        txn.open_table(REVISIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Handle to one bucket of objects.
    pub fn bucket(&self, name: &str) -> Bucket {
        Bucket::new(self.clone(), name)
    }

    // ── Objects ────────────────────────────────────────────────────

    pub(crate) fn object_get(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
        let value = table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    pub(crate) fn object_put(&self, key: &str, data: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
            table.insert(key, data).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, bytes = data.len(), "object stored");
        Ok(())
    }

    /// Delete an object. Returns true if it existed.
    pub(crate) fn object_delete(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "object deleted");
        Ok(existed)
    }

    /// Copy `src` over `dst` inside one write transaction.
    pub(crate) fn object_copy(&self, src: &str, dst: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
            let data = table
                .get(src)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| StateError::NotFound(src.to_string()))?;
            table.insert(dst, data.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%src, %dst, "object copied");
        Ok(())
    }

    /// Keys starting with `prefix`, in lexical order.
    pub(crate) fn object_keys(&self, prefix: &str) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
        let mut keys = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                keys.push(key.value().to_string());
            }
        }
        Ok(keys)
    }

    // ── Routing ────────────────────────────────────────────────────

    /// Insert or replace a service's routing configuration.
    pub fn put_routing_config(&self, service_id: &str, config: &RoutingConfig) -> StateResult<()> {
        let value = serde_json::to_vec(config).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ROUTING).map_err(map_err!(Table))?;
            table
                .insert(service_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%service_id, entries = config.entries.len(), "routing config stored");
        Ok(())
    }

    /// Get a service's routing configuration.
    pub fn routing_config(&self, service_id: &str) -> StateResult<Option<RoutingConfig>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROUTING).map_err(map_err!(Table))?;
        match table.get(service_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let config: RoutingConfig =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    /// Replace the entry list of an existing service, keeping its uri.
    pub fn replace_routing_entries(
        &self,
        service_id: &str,
        entries: Vec<RoutingEntry>,
    ) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ROUTING).map_err(map_err!(Table))?;
            let current: RoutingConfig = match table.get(service_id).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(service_id.to_string())),
            };
            let updated = RoutingConfig {
                uri: current.uri,
                entries,
            };
            let value = serde_json::to_vec(&updated).map_err(map_err!(Serialize))?;
            table
                .insert(service_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%service_id, "routing entries replaced");
        Ok(())
    }

    // ── Revisions ──────────────────────────────────────────────────

    /// Record a revision as existing for a service.
    pub fn put_revision(&self, service_id: &str, record: &RevisionRecord) -> StateResult<()> {
        let key = revision_key(service_id, &record.name);
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(REVISIONS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Forget a revision. Returns true if it existed.
    pub fn delete_revision(&self, service_id: &str, name: &str) -> StateResult<bool> {
        let key = revision_key(service_id, name);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(REVISIONS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    /// All revisions recorded for a service.
    pub fn revisions_for_service(&self, service_id: &str) -> StateResult<Vec<RevisionRecord>> {
        let prefix = revision_key(service_id, "");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(REVISIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let record: RevisionRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }
}

fn revision_key(service_id: &str, name: &str) -> String {
    format!("{service_id}|{name}")
}

impl RoutingPlatform for StateStore {
    fn get_routing_config(&self, service_id: &str) -> Result<RoutingConfig, RoutingError> {
        self.routing_config(service_id)?
            .ok_or_else(|| RoutingError::ServiceNotFound(service_id.to_string()))
    }

    fn update_routing_config(
        &self,
        service_id: &str,
        entries: Vec<RoutingEntry>,
    ) -> Result<(), RoutingError> {
        Ok(self.replace_routing_entries(service_id, entries)?)
    }

    fn list_revisions(&self, service_id: &str) -> Result<Vec<RevisionRecord>, RoutingError> {
        Ok(self.revisions_for_service(service_id)?)
    }

    fn delete_revision(&self, service_id: &str, name: &str) -> Result<(), RoutingError> {
        if StateStore::delete_revision(self, service_id, name)? {
            debug!(%service_id, revision = %name, "revision deleted");
            Ok(())
        } else {
            Err(RoutingError::RevisionNotFound(name.to_string()))
        }
    }
}

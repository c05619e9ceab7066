//! Fault-injecting collaborators for unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use revsweep_core::{
    DeploymentEntry, ObjectStore, RevisionRecord, RoutingConfig, RoutingEntry, RoutingError,
    RoutingPlatform, StoreError, normalize_revision,
};
use revsweep_state::{Bucket, StateStore};

pub const SERVICE: &str = "projects/p/locations/us-central1/services/api-simulation";

/// Deployment entry deployed `hour` hours after a fixed epoch.
pub fn entry(revision: &str, us: &str, uk: &str, hour: u32) -> DeploymentEntry {
    DeploymentEntry {
        revision: revision.to_string(),
        us_version: us.to_string(),
        uk_version: uk.to_string(),
        deployed_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::hours(i64::from(hour)),
    }
}

pub fn route(revision: &str, tag: Option<&str>, percent: u32) -> RoutingEntry {
    RoutingEntry {
        revision: revision.to_string(),
        tag: tag.map(str::to_string),
        percent,
    }
}

#[derive(Default)]
struct BucketFaults {
    get: HashSet<String>,
    delete: HashSet<String>,
    delete_prefix: Option<String>,
    copy: bool,
    list: bool,
}

/// Bucket wrapper that fails selected calls.
#[derive(Clone)]
pub struct FaultyBucket {
    inner: Bucket,
    faults: Arc<Mutex<BucketFaults>>,
}

impl FaultyBucket {
    pub fn in_memory() -> Self {
        Self {
            inner: StateStore::open_in_memory().unwrap().bucket("meta"),
            faults: Arc::default(),
        }
    }

    pub fn inner(&self) -> Bucket {
        self.inner.clone()
    }

    pub fn fail_get(&self, key: &str) {
        self.faults.lock().unwrap().get.insert(key.to_string());
    }

    pub fn fail_delete(&self, key: &str) {
        self.faults.lock().unwrap().delete.insert(key.to_string());
    }

    pub fn fail_delete_prefix(&self, prefix: &str) {
        self.faults.lock().unwrap().delete_prefix = Some(prefix.to_string());
    }

    pub fn fail_copy(&self) {
        self.faults.lock().unwrap().copy = true;
    }

    pub fn fail_list(&self) {
        self.faults.lock().unwrap().list = true;
    }

    fn injected(op: &str) -> StoreError {
        StoreError::Backend(format!("injected {op} failure"))
    }
}

impl ObjectStore for FaultyBucket {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        if self.faults.lock().unwrap().get.contains(key) {
            return Err(Self::injected("get"));
        }
        self.inner.get(key)
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.inner.put(key, data)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        {
            let faults = self.faults.lock().unwrap();
            let by_prefix = faults
                .delete_prefix
                .as_deref()
                .is_some_and(|p| key.starts_with(p));
            if faults.delete.contains(key) || by_prefix {
                return Err(Self::injected("delete"));
            }
        }
        self.inner.delete(key)
    }

    fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        if self.faults.lock().unwrap().copy {
            return Err(Self::injected("copy"));
        }
        self.inner.copy(src, dst)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        if self.faults.lock().unwrap().list {
            return Err(Self::injected("list"));
        }
        self.inner.list(prefix)
    }
}

/// Routing platform wrapper that fails selected calls and counts updates.
#[derive(Clone)]
pub struct FaultyPlatform {
    inner: StateStore,
    fail_fetch: Arc<AtomicBool>,
    fail_update: Arc<AtomicBool>,
    fail_list: Arc<AtomicBool>,
    fail_delete: Arc<Mutex<HashSet<String>>>,
    updates: Arc<AtomicUsize>,
}

impl FaultyPlatform {
    pub fn with_routes(entries: Vec<RoutingEntry>) -> Self {
        let inner = StateStore::open_in_memory().unwrap();
        inner
            .put_routing_config(
                SERVICE,
                &RoutingConfig {
                    uri: "https://api-simulation.example".to_string(),
                    entries,
                },
            )
            .unwrap();
        Self {
            inner,
            fail_fetch: Arc::default(),
            fail_update: Arc::default(),
            fail_list: Arc::default(),
            fail_delete: Arc::default(),
            updates: Arc::default(),
        }
    }

    pub fn inner(&self) -> StateStore {
        self.inner.clone()
    }

    pub fn fail_fetch(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    pub fn fail_update(&self) {
        self.fail_update.store(true, Ordering::SeqCst);
    }

    pub fn fail_list(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    /// Fail deletes of revisions whose short name is `name`.
    pub fn fail_delete(&self, name: &str) {
        self.fail_delete.lock().unwrap().insert(name.to_string());
    }

    /// Seed revisions `{SERVICE}/revisions/{name}` as existing.
    pub fn with_revisions(self, names: &[&str]) -> Self {
        for name in names {
            self.inner
                .put_revision(
                    SERVICE,
                    &RevisionRecord {
                        name: format!("{SERVICE}/revisions/{name}"),
                        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                    },
                )
                .unwrap();
        }
        self
    }

    /// Short names of the revisions that still exist.
    pub fn revisions(&self) -> Vec<String> {
        self.inner
            .list_revisions(SERVICE)
            .unwrap()
            .into_iter()
            .map(|r| normalize_revision(&r.name).to_string())
            .collect()
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn entries(&self) -> Vec<RoutingEntry> {
        self.inner.get_routing_config(SERVICE).unwrap().entries
    }
}

impl RoutingPlatform for FaultyPlatform {
    fn get_routing_config(&self, service_id: &str) -> Result<RoutingConfig, RoutingError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(RoutingError::Backend("injected fetch failure".to_string()));
        }
        self.inner.get_routing_config(service_id)
    }

    fn update_routing_config(
        &self,
        service_id: &str,
        entries: Vec<RoutingEntry>,
    ) -> Result<(), RoutingError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(RoutingError::Backend("injected update failure".to_string()));
        }
        self.inner.update_routing_config(service_id, entries)
    }

    fn list_revisions(&self, service_id: &str) -> Result<Vec<RevisionRecord>, RoutingError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(RoutingError::Backend("injected list failure".to_string()));
        }
        self.inner.list_revisions(service_id)
    }

    fn delete_revision(&self, service_id: &str, name: &str) -> Result<(), RoutingError> {
        if self.fail_delete.lock().unwrap().contains(normalize_revision(name)) {
            return Err(RoutingError::Backend("injected delete failure".to_string()));
        }
        RoutingPlatform::delete_revision(&self.inner, service_id, name)
    }
}

//! Deployment manifest persistence.
//!
//! The manifest is a single JSON document in the metadata bucket. Writes go
//! through a fresh temporary key followed by a server-side copy onto the
//! canonical key, so a reader never observes a truncated document.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use revsweep_core::{DeploymentEntry, ManifestDocument, ObjectStore, StoreError};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::CleanupError;
use crate::offload::BlockingPool;

/// Handle to the manifest document at a fixed key.
#[derive(Clone)]
pub struct Manifest {
    store: Arc<dyn ObjectStore>,
    pool: BlockingPool,
    key: String,
}

impl Manifest {
    pub fn new(store: Arc<dyn ObjectStore>, pool: BlockingPool, key: &str) -> Self {
        Self {
            store,
            pool,
            key: key.to_string(),
        }
    }

    /// Prefix shared by every temporary key this manifest writes.
    pub fn temp_prefix(&self) -> String {
        format!("{}.tmp-", self.key)
    }

    /// Read all entries. A missing manifest is an empty list.
    pub async fn read(&self) -> Result<Vec<DeploymentEntry>, CleanupError> {
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        let fetched = self.pool.run(move || store.get(&key)).await?;

        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => {
                debug!(key = %self.key, "no manifest yet");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(CleanupError::ManifestRead {
                    key: self.key.clone(),
                    source,
                });
            }
        };

        let document: ManifestDocument =
            serde_json::from_slice(&bytes).map_err(|e| CleanupError::ManifestDecode {
                key: self.key.clone(),
                reason: e.to_string(),
            })?;
        let entries = document.into_entries();
        debug!(key = %self.key, entries = entries.len(), "manifest read");
        Ok(entries)
    }

    /// Replace the manifest with `entries`.
    ///
    /// Succeeds as soon as the copy onto the canonical key succeeds; failing
    /// to remove the temporary key afterwards is only logged.
    pub async fn write(&self, entries: &[DeploymentEntry]) -> Result<(), CleanupError> {
        let body = serde_json::to_vec_pretty(&ManifestDocument::new(entries.to_vec()))
            .map_err(|e| CleanupError::ManifestEncode(e.to_string()))?;
        let temp = temp_key(&self.key);

        let store = Arc::clone(&self.store);
        let put_key = temp.clone();
        self.pool
            .run(move || store.put(&put_key, &body))
            .await?
            .map_err(|source| CleanupError::ManifestWrite {
                key: temp.clone(),
                source,
            })?;

        let store = Arc::clone(&self.store);
        let (src, dst) = (temp.clone(), self.key.clone());
        let copied = self.pool.run(move || store.copy(&src, &dst)).await;

        self.discard_temp(&temp).await;

        copied?.map_err(|source| CleanupError::ManifestWrite {
            key: self.key.clone(),
            source,
        })?;
        info!(key = %self.key, entries = entries.len(), "manifest written");
        Ok(())
    }

    /// Append one deployment and write the manifest back.
    ///
    /// Returns the new number of entries.
    pub async fn append(&self, entry: DeploymentEntry) -> Result<usize, CleanupError> {
        let mut entries = self.read().await?;
        entries.push(entry);
        self.write(&entries).await?;
        Ok(entries.len())
    }

    async fn discard_temp(&self, temp: &str) {
        let store = Arc::clone(&self.store);
        let key = temp.to_string();
        match self.pool.run(move || store.delete(&key)).await {
            Ok(Ok(())) => debug!(key = %temp, "temporary manifest removed"),
            Ok(Err(e)) => warn!(key = %temp, error = %e, "leaving temporary manifest behind"),
            Err(e) => warn!(key = %temp, error = %e, "leaving temporary manifest behind"),
        }
    }
}

/// A key no other writer will pick: `{key}.tmp-{16 hex chars}`.
fn temp_key(key: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{key}.tmp-{}", &digest[..16])
}

//! A named bucket of objects inside the state store.

use revsweep_core::{ObjectStore, StoreError};

use crate::store::StateStore;

/// One flat object namespace. Keys are stored as `{bucket}/{key}`.
#[derive(Clone)]
pub struct Bucket {
    store: StateStore,
    name: String,
}

impl Bucket {
    pub(crate) fn new(store: StateStore, name: &str) -> Self {
        Self {
            store,
            name: name.to_string(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}/{}", self.name, key)
    }
}

impl ObjectStore for Bucket {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.store.object_get(&self.full_key(key))?.is_some())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.store
            .object_get(&self.full_key(key))?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        Ok(self.store.object_put(&self.full_key(key), data)?)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        if self.store.object_delete(&self.full_key(key))? {
            Ok(())
        } else {
            Err(StoreError::NotFound(key.to_string()))
        }
    }

    fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        self.store
            .object_copy(&self.full_key(src), &self.full_key(dst))
            .map_err(|err| match StoreError::from(err) {
                StoreError::NotFound(_) => StoreError::NotFound(src.to_string()),
                other => other,
            })
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let bucket_prefix = self.full_key("");
        let keys = self.store.object_keys(&self.full_key(prefix))?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&bucket_prefix).map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_are_isolated() {
        let store = StateStore::open_in_memory().unwrap();
        let a = store.bucket("a");
        let b = store.bucket("b");

        a.put("us.1.0.0.json", b"{}").unwrap();
        assert!(a.exists("us.1.0.0.json").unwrap());
        assert!(!b.exists("us.1.0.0.json").unwrap());
        assert_eq!(a.list("").unwrap(), vec!["us.1.0.0.json"]);
        assert!(b.list("").unwrap().is_empty());
    }

    #[test]
    fn missing_objects_report_bucket_relative_key() {
        let store = StateStore::open_in_memory().unwrap();
        let bucket = store.bucket("meta");

        assert_eq!(
            bucket.get("latest.json"),
            Err(StoreError::NotFound("latest.json".to_string()))
        );
        assert_eq!(
            bucket.delete("latest.json"),
            Err(StoreError::NotFound("latest.json".to_string()))
        );
        assert_eq!(
            bucket.copy("tmp", "manifest.json"),
            Err(StoreError::NotFound("tmp".to_string()))
        );
    }

    #[test]
    fn list_with_prefix() {
        let store = StateStore::open_in_memory().unwrap();
        let bucket = store.bucket("meta");
        bucket.put("us.1.0.0.json", b"{}").unwrap();
        bucket.put("uk.2.0.0.json", b"{}").unwrap();
        bucket.put("us.1.1.0.json", b"{}").unwrap();

        assert_eq!(
            bucket.list("us.").unwrap(),
            vec!["us.1.0.0.json", "us.1.1.0.json"]
        );
    }
}

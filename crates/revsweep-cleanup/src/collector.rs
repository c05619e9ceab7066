//! Metadata garbage collector.
//!
//! Deletes per-version metadata files whose `revision` is no longer
//! retained. Only keys named `{country}.{version}.json` are considered;
//! anything else in the bucket is invisible. Anything that cannot be
//! decided with certainty is kept.

use std::sync::Arc;

use revsweep_core::{MetadataBody, ObjectStore, normalize_revision, parse_metadata_key};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::CleanupError;
use crate::offload::BlockingPool;
use crate::policy::RetentionSet;

/// Result of one collection pass. Each list is sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcOutcome {
    pub deleted: Vec<String>,
    pub kept: Vec<String>,
    pub errors: Vec<String>,
}

enum Verdict {
    Skip,
    Keep(&'static str),
    Delete,
}

#[derive(Clone)]
pub struct MetadataCollector {
    store: Arc<dyn ObjectStore>,
    pool: BlockingPool,
    reserved: Vec<String>,
    temp_prefix: String,
    delete_concurrency: usize,
}

impl MetadataCollector {
    /// `reserved` keys are never touched nor reported; neither are keys
    /// starting with `temp_prefix` (leftover manifest writes).
    pub fn new(
        store: Arc<dyn ObjectStore>,
        pool: BlockingPool,
        reserved: Vec<String>,
        temp_prefix: String,
        delete_concurrency: usize,
    ) -> Self {
        Self {
            store,
            pool,
            reserved,
            temp_prefix,
            delete_concurrency: delete_concurrency.max(1),
        }
    }

    pub async fn collect(
        &self,
        retained: &RetentionSet,
        dry_run: bool,
    ) -> Result<GcOutcome, CleanupError> {
        let store = Arc::clone(&self.store);
        let keys = self
            .pool
            .run(move || store.list(""))
            .await?
            .map_err(CleanupError::MetadataList)?;

        let mut outcome = GcOutcome::default();
        let mut candidates = Vec::new();

        for key in keys {
            match self.judge(&key, retained).await {
                Verdict::Skip => {}
                Verdict::Keep(reason) => {
                    debug!(key = %key, reason, "metadata kept");
                    outcome.kept.push(key);
                }
                Verdict::Delete => candidates.push(key),
            }
        }

        if dry_run {
            info!(candidates = candidates.len(), "dry run, metadata left untouched");
            outcome.deleted = candidates;
        } else {
            self.delete_all(candidates, &mut outcome).await;
        }

        outcome.deleted.sort();
        outcome.kept.sort();
        info!(
            deleted = outcome.deleted.len(),
            kept = outcome.kept.len(),
            errors = outcome.errors.len(),
            "metadata collection finished"
        );
        Ok(outcome)
    }

    async fn judge(&self, key: &str, retained: &RetentionSet) -> Verdict {
        if self.reserved.iter().any(|r| r == key) || key.starts_with(&self.temp_prefix) {
            return Verdict::Skip;
        }
        if parse_metadata_key(key).is_none() {
            debug!(key, "not a metadata file, ignored");
            return Verdict::Skip;
        }

        let store = Arc::clone(&self.store);
        let owned = key.to_string();
        let bytes = match self.pool.run(move || store.get(&owned)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(key, error = %e, "metadata unreadable, keeping");
                return Verdict::Keep("unreadable");
            }
            Err(e) => {
                warn!(key, error = %e, "metadata unreadable, keeping");
                return Verdict::Keep("unreadable");
            }
        };

        let body: MetadataBody = match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            Err(e) => {
                warn!(key, error = %e, "metadata is not valid JSON, keeping");
                return Verdict::Keep("malformed");
            }
        };

        match body.revision() {
            None => Verdict::Keep("no revision"),
            Some(revision) if retained.contains(revision) => Verdict::Keep("retained"),
            Some(revision) => {
                debug!(key, revision = normalize_revision(revision), "metadata references dropped revision");
                Verdict::Delete
            }
        }
    }

    /// Delete every candidate, bounded by `delete_concurrency`. One failure
    /// never stops the others.
    async fn delete_all(&self, candidates: Vec<String>, outcome: &mut GcOutcome) {
        let permits = Arc::new(Semaphore::new(self.delete_concurrency));
        let mut tasks = JoinSet::new();

        for key in candidates {
            let permits = Arc::clone(&permits);
            let store = Arc::clone(&self.store);
            let pool = self.pool.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let target = key.clone();
                let result = match pool.run(move || store.delete(&target)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(source)) => Err(CleanupError::MetadataDelete {
                        key: key.clone(),
                        source,
                    }),
                    Err(e) => Err(CleanupError::from(e)),
                };
                (key, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, Ok(()))) => {
                    debug!(key = %key, "metadata deleted");
                    outcome.deleted.push(key);
                }
                Ok((key, Err(e))) => {
                    warn!(key = %key, error = %e, "metadata delete failed");
                    outcome.errors.push(e.to_string());
                }
                Err(e) => {
                    warn!(error = %e, "metadata delete task failed");
                    outcome.errors.push(format!("metadata delete task failed: {e}"));
                }
            }
        }
        outcome.errors.sort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use revsweep_core::StoreError;

    use crate::testing::FaultyBucket;

    fn collector(bucket: &FaultyBucket, concurrency: usize) -> MetadataCollector {
        MetadataCollector::new(
            Arc::new(bucket.clone()),
            BlockingPool::new(4),
            vec!["latest.json".to_string(), "manifest.json".to_string()],
            "manifest.json.tmp-".to_string(),
            concurrency,
        )
    }

    fn seed(bucket: &FaultyBucket, files: &[(&str, &str)]) {
        for (key, body) in files {
            bucket.put(key, body.as_bytes()).unwrap();
        }
    }

    #[tokio::test]
    async fn deletes_only_unretained_references() {
        let bucket = FaultyBucket::in_memory();
        seed(
            &bucket,
            &[
                ("us.1.0.0.json", r#"{"revision":"rev-1"}"#),
                ("us.1.1.0.json", r#"{"revision":"rev-2"}"#),
                ("uk.2.0.0.json", r#"{"revision":"projects/p/services/s/revisions/rev-3"}"#),
            ],
        );
        let retained: RetentionSet = ["rev-2"].into_iter().collect();

        let outcome = collector(&bucket, 2).collect(&retained, false).await.unwrap();

        assert_eq!(outcome.deleted, vec!["uk.2.0.0.json", "us.1.0.0.json"]);
        assert_eq!(outcome.kept, vec!["us.1.1.0.json"]);
        assert!(outcome.errors.is_empty());
        assert_eq!(bucket.list("").unwrap(), vec!["us.1.1.0.json"]);
    }

    #[tokio::test]
    async fn reserved_and_temp_keys_are_invisible() {
        let bucket = FaultyBucket::in_memory();
        seed(
            &bucket,
            &[
                ("latest.json", r#"{"revision":"rev-old"}"#),
                ("manifest.json", r#"{"deployments":[]}"#),
                ("manifest.json.tmp-0123456789abcdef", r#"{"revision":"rev-old"}"#),
            ],
        );

        let outcome = collector(&bucket, 2)
            .collect(&RetentionSet::new(), false)
            .await
            .unwrap();

        assert_eq!(outcome, GcOutcome::default());
        assert_eq!(bucket.list("").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn non_metadata_objects_are_invisible() {
        let bucket = FaultyBucket::in_memory();
        seed(
            &bucket,
            &[
                ("us.1.0.0.json", r#"{"revision":"rev-gone"}"#),
                ("deploy-log.json", r#"{"revision":"rev-gone"}"#),
                ("exports/us.1.0.0.json", r#"{"revision":"rev-gone"}"#),
                ("us.latest.json", r#"{"revision":"rev-gone"}"#),
            ],
        );

        let outcome = collector(&bucket, 2)
            .collect(&RetentionSet::new(), false)
            .await
            .unwrap();

        assert_eq!(outcome.deleted, vec!["us.1.0.0.json"]);
        assert!(outcome.kept.is_empty());
        assert_eq!(
            bucket.list("").unwrap(),
            vec!["deploy-log.json", "exports/us.1.0.0.json", "us.latest.json"]
        );
    }

    #[tokio::test]
    async fn ambiguous_files_are_kept() {
        let bucket = FaultyBucket::in_memory();
        seed(
            &bucket,
            &[
                ("us.1.0.0.json", "{not json"),
                ("us.1.1.0.json", r#"{"model_version":"1.1.0"}"#),
                ("us.1.2.0.json", r#"{"revision":""}"#),
                ("us.1.3.0.json", r#"{"revision":"rev-gone"}"#),
            ],
        );
        bucket.fail_get("us.1.3.0.json");

        let outcome = collector(&bucket, 2)
            .collect(&RetentionSet::new(), false)
            .await
            .unwrap();

        assert!(outcome.deleted.is_empty());
        assert_eq!(outcome.kept.len(), 4);
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn delete_failures_do_not_stop_the_rest() {
        let bucket = FaultyBucket::in_memory();
        let files: Vec<(String, String)> = (0..6)
            .map(|i| (format!("us.1.{i}.0.json"), format!(r#"{{"revision":"rev-{i}"}}"#)))
            .collect();
        for (key, body) in &files {
            bucket.put(key, body.as_bytes()).unwrap();
        }
        bucket.fail_delete("us.1.3.0.json");

        let outcome = collector(&bucket, 2)
            .collect(&RetentionSet::new(), false)
            .await
            .unwrap();

        assert_eq!(outcome.deleted.len(), 5);
        assert!(!outcome.deleted.contains(&"us.1.3.0.json".to_string()));
        assert!(outcome.kept.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("us.1.3.0.json"));
        assert_eq!(bucket.list("").unwrap(), vec!["us.1.3.0.json"]);
    }

    #[tokio::test]
    async fn dry_run_deletes_nothing() {
        let bucket = FaultyBucket::in_memory();
        seed(&bucket, &[("us.1.0.0.json", r#"{"revision":"rev-1"}"#)]);

        let outcome = collector(&bucket, 2)
            .collect(&RetentionSet::new(), true)
            .await
            .unwrap();

        assert_eq!(outcome.deleted, vec!["us.1.0.0.json"]);
        assert_eq!(bucket.list("").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listing_failure_is_an_error() {
        let bucket = FaultyBucket::in_memory();
        bucket.fail_list();

        let err = collector(&bucket, 2)
            .collect(&RetentionSet::new(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, CleanupError::MetadataList(_)));
    }

    /// Bucket whose deletes block for a while and record how many overlap.
    #[derive(Clone)]
    struct SlowDeletes {
        inner: FaultyBucket,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl ObjectStore for SlowDeletes {
        fn exists(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.exists(key)
        }

        fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
            self.inner.get(key)
        }

        fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
            self.inner.put(key, data)
        }

        fn delete(&self, key: &str) -> Result<(), StoreError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(25));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.delete(key)
        }

        fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
            self.inner.copy(src, dst)
        }

        fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.inner.list(prefix)
        }
    }

    #[tokio::test]
    async fn deletes_are_bounded_by_concurrency() {
        let bucket = FaultyBucket::in_memory();
        for i in 0..12 {
            bucket
                .put(&format!("us.1.{i}.0.json"), format!(r#"{{"revision":"rev-{i}"}}"#).as_bytes())
                .unwrap();
        }
        let slow = SlowDeletes {
            inner: bucket.clone(),
            in_flight: Arc::default(),
            peak: Arc::default(),
        };
        // More workers than permits, so only the semaphore can hold deletes back.
        let collector = MetadataCollector::new(
            Arc::new(slow.clone()),
            BlockingPool::new(8),
            vec!["latest.json".to_string(), "manifest.json".to_string()],
            "manifest.json.tmp-".to_string(),
            3,
        );

        let outcome = collector.collect(&RetentionSet::new(), false).await.unwrap();

        assert_eq!(outcome.deleted.len(), 12);
        assert!(outcome.errors.is_empty());
        let peak = slow.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak {peak} exceeded the bound");
        assert!(peak > 1, "deletes never overlapped");
        assert!(bucket.list("").unwrap().is_empty());
    }
}

//! Revision tagger: resolves a country model version to a tagged address.
//!
//! The metadata file for the version names the revision; the tagger makes
//! sure that revision carries the version's zero-traffic tag and returns the
//! service uri.

use std::sync::Arc;

use revsweep_core::{
    Country, MetadataBody, ObjectStore, RoutingEntry, RoutingPlatform, StoreError, metadata_key,
    normalize_revision, tag_name,
};
use tracing::{debug, info, warn};

use crate::error::CleanupError;
use crate::offload::BlockingPool;

#[derive(Clone)]
pub struct RevisionTagger {
    store: Arc<dyn ObjectStore>,
    platform: Arc<dyn RoutingPlatform>,
    pool: BlockingPool,
    service_id: String,
}

impl RevisionTagger {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        platform: Arc<dyn RoutingPlatform>,
        pool: BlockingPool,
        service_id: &str,
    ) -> Self {
        Self {
            store,
            platform,
            pool,
            service_id: service_id.to_string(),
        }
    }

    /// Tag the revision serving `country` at `model_version`.
    ///
    /// Returns `None` when no metadata file names a revision for that
    /// version. A tag found on another revision moves to this one.
    pub async fn tag(
        &self,
        country: Country,
        model_version: &str,
    ) -> Result<Option<String>, CleanupError> {
        let key = metadata_key(country.as_str(), model_version);
        let Some(revision) = self.revision_for(&key).await? else {
            return Ok(None);
        };
        let tag = tag_name(country.as_str(), model_version);

        let platform = Arc::clone(&self.platform);
        let service = self.service_id.clone();
        let config = self
            .pool
            .run(move || platform.get_routing_config(&service))
            .await?
            .map_err(|source| CleanupError::RoutingFetch {
                service: self.service_id.clone(),
                source,
            })?;

        let wanted = normalize_revision(&revision);
        let already = config
            .entries
            .iter()
            .any(|e| normalize_revision(&e.revision) == wanted && e.tag() == Some(tag.as_str()));
        if already {
            debug!(revision = %revision, tag = %tag, "revision already tagged");
            return Ok(Some(config.uri));
        }

        let mut entries = Vec::with_capacity(config.entries.len() + 1);
        for mut entry in config.entries {
            if entry.tag() != Some(tag.as_str()) {
                entries.push(entry);
                continue;
            }
            info!(tag = %tag, from = %entry.revision, "moving tag off previous revision");
            // Live traffic stays routed; only the alias moves.
            if entry.serves_traffic() {
                entry.tag = None;
                entries.push(entry);
            }
        }
        entries.push(RoutingEntry {
            revision: revision.clone(),
            tag: Some(tag.clone()),
            percent: 0,
        });

        let platform = Arc::clone(&self.platform);
        let service = self.service_id.clone();
        self.pool
            .run(move || platform.update_routing_config(&service, entries))
            .await?
            .map_err(|source| CleanupError::RoutingUpdate {
                service: self.service_id.clone(),
                source,
            })?;

        info!(revision = %revision, tag = %tag, "revision tagged");
        Ok(Some(config.uri))
    }

    async fn revision_for(&self, key: &str) -> Result<Option<String>, CleanupError> {
        let store = Arc::clone(&self.store);
        let owned = key.to_string();
        let bytes = match self.pool.run(move || store.get(&owned)).await? {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => {
                debug!(key, "no metadata for version");
                return Ok(None);
            }
            Err(source) => {
                return Err(CleanupError::MetadataRead {
                    key: key.to_string(),
                    source,
                });
            }
        };

        match serde_json::from_slice::<MetadataBody>(&bytes) {
            Ok(body) => Ok(body.revision().map(str::to_string)),
            Err(e) => {
                warn!(key, error = %e, "metadata is not valid JSON");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FaultyBucket, FaultyPlatform, SERVICE, route};

    fn tagger(bucket: &FaultyBucket, platform: &FaultyPlatform) -> RevisionTagger {
        RevisionTagger::new(
            Arc::new(bucket.clone()),
            Arc::new(platform.clone()),
            BlockingPool::new(2),
            SERVICE,
        )
    }

    #[tokio::test]
    async fn unknown_version_is_none() {
        let bucket = FaultyBucket::in_memory();
        let platform = FaultyPlatform::with_routes(vec![]);

        let uri = tagger(&bucket, &platform).tag(Country::Us, "9.9.9").await.unwrap();

        assert_eq!(uri, None);
        assert_eq!(platform.update_count(), 0);
    }

    #[tokio::test]
    async fn metadata_without_revision_is_none() {
        let bucket = FaultyBucket::in_memory();
        bucket.put("uk.2.0.0.json", br#"{"model_version":"2.0.0"}"#).unwrap();
        let platform = FaultyPlatform::with_routes(vec![]);

        let uri = tagger(&bucket, &platform).tag(Country::Uk, "2.0.0").await.unwrap();

        assert_eq!(uri, None);
    }

    #[tokio::test]
    async fn tags_revision_with_zero_traffic() {
        let bucket = FaultyBucket::in_memory();
        bucket.put("us.1.459.0.json", br#"{"revision":"rev-7"}"#).unwrap();
        let platform = FaultyPlatform::with_routes(vec![route("rev-live", None, 100)]);

        let uri = tagger(&bucket, &platform).tag(Country::Us, "1.459.0").await.unwrap();

        assert_eq!(uri.as_deref(), Some("https://api-simulation.example"));
        assert_eq!(
            platform.entries(),
            vec![
                route("rev-live", None, 100),
                route("rev-7", Some("country-us-model-1-459-0"), 0),
            ]
        );
    }

    #[tokio::test]
    async fn existing_tag_is_not_rewritten() {
        let bucket = FaultyBucket::in_memory();
        bucket
            .put("us.1.0.0.json", br#"{"revision":"projects/p/services/s/revisions/rev-1"}"#)
            .unwrap();
        let platform =
            FaultyPlatform::with_routes(vec![route("rev-1", Some("country-us-model-1-0-0"), 0)]);

        let uri = tagger(&bucket, &platform).tag(Country::Us, "1.0.0").await.unwrap();

        assert!(uri.is_some());
        assert_eq!(platform.update_count(), 0);
    }

    #[tokio::test]
    async fn tag_moves_between_revisions() {
        let bucket = FaultyBucket::in_memory();
        bucket.put("us.1.0.0.json", br#"{"revision":"rev-2"}"#).unwrap();
        let platform = FaultyPlatform::with_routes(vec![
            route("rev-1", Some("country-us-model-1-0-0"), 0),
            route("rev-live", Some("country-us-model-1-0-0"), 100),
        ]);

        tagger(&bucket, &platform).tag(Country::Us, "1.0.0").await.unwrap();

        assert_eq!(
            platform.entries(),
            vec![
                route("rev-live", None, 100),
                route("rev-2", Some("country-us-model-1-0-0"), 0),
            ]
        );
        assert_eq!(platform.update_count(), 1);
    }

    #[tokio::test]
    async fn update_failure_is_an_error() {
        let bucket = FaultyBucket::in_memory();
        bucket.put("us.1.0.0.json", br#"{"revision":"rev-2"}"#).unwrap();
        let platform = FaultyPlatform::with_routes(vec![]);
        platform.fail_update();

        let err = tagger(&bucket, &platform).tag(Country::Us, "1.0.0").await.unwrap_err();

        assert!(matches!(err, CleanupError::RoutingUpdate { .. }));
    }
}

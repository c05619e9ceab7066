//! Revision reaper: deletes platform revisions that fell out of retention.
//!
//! Runs after routing has been pruned. A revision that any surviving routing
//! entry still names is left alone, whatever its retention status: live
//! traffic and untagged entries keep their revision reachable.

use std::collections::BTreeSet;
use std::sync::Arc;

use revsweep_core::{RevisionRecord, RoutingEntry, RoutingPlatform, normalize_revision};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::CleanupError;
use crate::offload::BlockingPool;
use crate::policy::RetentionSet;

/// Result of one reaping pass. Names are normalized and sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReapOutcome {
    pub deleted: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct RevisionReaper {
    platform: Arc<dyn RoutingPlatform>,
    pool: BlockingPool,
    service_id: String,
}

impl RevisionReaper {
    pub fn new(platform: Arc<dyn RoutingPlatform>, pool: BlockingPool, service_id: &str) -> Self {
        Self {
            platform,
            pool,
            service_id: service_id.to_string(),
        }
    }

    /// Listed revisions that are neither retained nor named by `routed`.
    ///
    /// Returns the names as listed, so they can be handed back to the
    /// platform unchanged.
    pub fn candidates(
        listed: &[RevisionRecord],
        routed: &[RoutingEntry],
        retained: &RetentionSet,
    ) -> Vec<String> {
        let referenced: BTreeSet<&str> = routed
            .iter()
            .map(|e| normalize_revision(&e.revision))
            .collect();
        listed
            .iter()
            .filter(|r| !retained.contains(&r.name))
            .filter(|r| !referenced.contains(normalize_revision(&r.name)))
            .map(|r| r.name.clone())
            .collect()
    }

    /// Delete every candidate, one call each, continuing past failures.
    ///
    /// `routed` is the routing entry list as it stands after pruning. With
    /// `dry_run` set the candidates are reported but nothing is deleted.
    pub async fn reap(
        &self,
        retained: &RetentionSet,
        routed: &[RoutingEntry],
        dry_run: bool,
    ) -> Result<ReapOutcome, CleanupError> {
        let platform = Arc::clone(&self.platform);
        let service = self.service_id.clone();
        let listed = self
            .pool
            .run(move || platform.list_revisions(&service))
            .await?
            .map_err(|source| CleanupError::RevisionList {
                service: self.service_id.clone(),
                source,
            })?;

        let candidates = Self::candidates(&listed, routed, retained);
        let mut outcome = ReapOutcome::default();
        if dry_run {
            info!(candidates = candidates.len(), "dry run, revisions left in place");
            outcome.deleted = candidates
                .iter()
                .map(|name| normalize_revision(name).to_string())
                .collect();
            outcome.deleted.sort();
            return Ok(outcome);
        }

        for name in candidates {
            let platform = Arc::clone(&self.platform);
            let service = self.service_id.clone();
            let target = name.clone();
            let result = match self
                .pool
                .run(move || platform.delete_revision(&service, &target))
                .await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(CleanupError::RevisionDelete {
                    revision: name.clone(),
                    source,
                }),
                Err(e) => Err(CleanupError::from(e)),
            };
            match result {
                Ok(()) => {
                    debug!(revision = %name, "revision deleted");
                    outcome.deleted.push(normalize_revision(&name).to_string());
                }
                Err(e) => {
                    warn!(revision = %name, error = %e, "revision delete failed");
                    outcome.errors.push(e.to_string());
                }
            }
        }

        outcome.deleted.sort();
        info!(
            service = %self.service_id,
            deleted = outcome.deleted.len(),
            errors = outcome.errors.len(),
            "revision reaping finished"
        );
        Ok(outcome)
    }
}

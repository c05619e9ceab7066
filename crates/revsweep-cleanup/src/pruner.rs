//! Traffic pruner: drops zero-traffic tags of revisions outside retention.

use std::sync::Arc;

use revsweep_core::{RoutingConfig, RoutingEntry, RoutingPlatform, normalize_revision};
use tracing::{debug, info};

use crate::error::CleanupError;
use crate::offload::BlockingPool;
use crate::policy::RetentionSet;

/// Partition of a routing configuration into survivors and removals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    pub keep: Vec<RoutingEntry>,
    pub remove: Vec<RoutingEntry>,
}

impl PrunePlan {
    pub fn is_noop(&self) -> bool {
        self.remove.is_empty()
    }

    /// Tags of the entries scheduled for removal, in routing order.
    pub fn removed_tags(&self) -> Vec<String> {
        self.remove
            .iter()
            .filter_map(|e| e.tag().map(str::to_string))
            .collect()
    }
}

#[derive(Clone)]
pub struct TrafficPruner {
    platform: Arc<dyn RoutingPlatform>,
    pool: BlockingPool,
    service_id: String,
}

impl TrafficPruner {
    pub fn new(platform: Arc<dyn RoutingPlatform>, pool: BlockingPool, service_id: &str) -> Self {
        Self {
            platform,
            pool,
            service_id: service_id.to_string(),
        }
    }

    /// Decide which entries survive.
    ///
    /// An entry is kept when it serves live traffic, when it has no tag, or
    /// when its revision is retained. Everything else is removed.
    pub fn plan(config: &RoutingConfig, retained: &RetentionSet) -> PrunePlan {
        let mut plan = PrunePlan::default();
        for entry in &config.entries {
            let keep = entry.serves_traffic()
                || entry.tag().is_none()
                || retained.contains(&entry.revision);
            if keep {
                plan.keep.push(entry.clone());
            } else {
                plan.remove.push(entry.clone());
            }
        }
        plan
    }

    /// Fetch, plan, and apply the plan in one update.
    ///
    /// With `dry_run` set the plan is computed but never written. Returns the
    /// applied (or, for a dry run, applicable) plan.
    pub async fn prune(
        &self,
        retained: &RetentionSet,
        dry_run: bool,
    ) -> Result<PrunePlan, CleanupError> {
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

        let plan = Self::plan(&config, retained);
        for entry in &plan.remove {
            debug!(
                revision = normalize_revision(&entry.revision),
                tag = entry.tag().unwrap_or_default(),
                "tag scheduled for removal"
            );
        }
        if plan.is_noop() {
            debug!(service = %self.service_id, entries = plan.keep.len(), "routing already pruned");
            return Ok(plan);
        }

        if dry_run {
            info!(service = %self.service_id, removable = plan.remove.len(), "dry run, routing left untouched");
            return Ok(plan);
        }

        let platform = Arc::clone(&self.platform);
        let service = self.service_id.clone();
        let keep = plan.keep.clone();
        self.pool
            .run(move || platform.update_routing_config(&service, keep))
            .await?
            .map_err(|source| CleanupError::RoutingUpdate {
                service: self.service_id.clone(),
                source,
            })?;

        info!(service = %self.service_id, removed = plan.remove.len(), "routing pruned");
        Ok(plan)
    }
}

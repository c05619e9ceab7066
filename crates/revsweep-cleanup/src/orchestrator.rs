//! Cleanup orchestrator: drives one cleanup run through its phases.
//!
//! A run reads the manifest, computes the retention set, then prunes
//! routing and collects metadata concurrently. When asked to, it then
//! deletes platform revisions nothing routes to any more, before rewriting
//! the manifest down to the retained entries. Remote failures never abort the run: each
//! is rendered into the report's `errors` and the remaining phases proceed
//! with whatever partial result the failed step left behind.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use revsweep_core::{
    Country, DeploymentEntry, KeepCount, ObjectStore, RoutingPlatform, Settings, ValidationError,
    metadata_key, normalize_revision,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collector::{GcOutcome, MetadataCollector};
use crate::error::CleanupError;
use crate::manifest::Manifest;
use crate::offload::BlockingPool;
use crate::policy::{RetentionPolicy, RetentionSet, Safeguard};
use crate::pruner::TrafficPruner;
use crate::reaper::{ReapOutcome, RevisionReaper};
use crate::tagger::RevisionTagger;

pub const NOTICE_MANIFEST_UNAVAILABLE: &str = "manifest unavailable";
pub const NOTICE_EMPTY_MANIFEST: &str = "no manifest entries; nothing to reconcile";

/// Phase of a cleanup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPhase {
    Start,
    ManifestRead,
    PolicyComputed,
    /// Routing pruning and metadata collection, run side by side.
    Reclaiming,
    RevisionDelete,
    ManifestRewrite,
    Done,
}

impl fmt::Display for CleanupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CleanupPhase::Start => "start",
            CleanupPhase::ManifestRead => "manifest-read",
            CleanupPhase::PolicyComputed => "policy-computed",
            CleanupPhase::Reclaiming => "pruning+gc",
            CleanupPhase::RevisionDelete => "revision-delete",
            CleanupPhase::ManifestRewrite => "manifest-rewrite",
            CleanupPhase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Switches for one cleanup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOptions {
    /// Report what would change without changing it.
    pub dry_run: bool,
    /// Also delete platform revisions that are neither retained nor routed.
    pub delete_revisions: bool,
}

/// Result of a cleanup run or preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub keep_count: KeepCount,
    pub total_entries: usize,
    /// Retained revisions, normalized and sorted.
    pub revisions_kept: Vec<String>,
    /// Manifest revisions that fell out of retention, normalized and sorted.
    pub revisions_removed: Vec<String>,
    pub safeguards: Vec<Safeguard>,
    pub tags_removed: Vec<String>,
    pub metadata_files_deleted: Vec<String>,
    pub metadata_files_kept: Vec<String>,
    /// Platform revisions deleted. Empty unless revision deletion was asked for.
    pub revisions_deleted: Vec<String>,
    /// Why the run stopped early, if it did.
    pub notice: Option<String>,
    pub errors: Vec<String>,
}

impl CleanupReport {
    fn new(keep: KeepCount, dry_run: bool) -> Self {
        Self {
            dry_run,
            keep_count: keep,
            total_entries: 0,
            revisions_kept: Vec::new(),
            revisions_removed: Vec::new(),
            safeguards: Vec::new(),
            tags_removed: Vec::new(),
            metadata_files_deleted: Vec::new(),
            metadata_files_kept: Vec::new(),
            revisions_deleted: Vec::new(),
            notice: None,
            errors: Vec::new(),
        }
    }
}

/// Result of an orphan sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanSweepReport {
    pub existing_revisions: Vec<String>,
    pub metadata_files_deleted: Vec<String>,
    pub metadata_files_kept: Vec<String>,
    pub errors: Vec<String>,
}

/// A deployment as recorded by [`CleanupEngine::record`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedDeployment {
    pub revision: String,
    /// Manifest length after the append.
    pub entries: usize,
    pub metadata_files_written: Vec<String>,
}

/// Tunables for one engine, usually derived from [`Settings`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub service_id: String,
    pub manifest_key: String,
    pub live_pointer_key: String,
    pub workers: usize,
    pub delete_concurrency: usize,
    pub timeout: Duration,
    pub default_keep: KeepCount,
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, ValidationError> {
        Ok(Self {
            service_id: settings.service.service_id.clone(),
            manifest_key: settings.storage.manifest_key.clone(),
            live_pointer_key: settings.storage.live_pointer_key.clone(),
            workers: settings.cleanup.workers,
            delete_concurrency: settings.cleanup.delete_concurrency,
            timeout: Duration::from_secs(settings.cleanup.timeout_secs),
            default_keep: KeepCount::new(i64::from(settings.cleanup.default_keep))?,
        })
    }
}

/// The cleanup engine for one service and one metadata bucket.
pub struct CleanupEngine {
    store: Arc<dyn ObjectStore>,
    manifest: Manifest,
    pruner: TrafficPruner,
    collector: MetadataCollector,
    reaper: RevisionReaper,
    tagger: RevisionTagger,
    platform: Arc<dyn RoutingPlatform>,
    pool: BlockingPool,
    service_id: String,
    timeout: Duration,
    default_keep: KeepCount,
}

impl CleanupEngine {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        platform: Arc<dyn RoutingPlatform>,
        config: EngineConfig,
    ) -> Self {
        let pool = BlockingPool::new(config.workers);
        let manifest = Manifest::new(Arc::clone(&store), pool.clone(), &config.manifest_key);
        let collector = MetadataCollector::new(
            Arc::clone(&store),
            pool.clone(),
            vec![config.live_pointer_key.clone(), config.manifest_key.clone()],
            manifest.temp_prefix(),
            config.delete_concurrency,
        );
        let pruner = TrafficPruner::new(Arc::clone(&platform), pool.clone(), &config.service_id);
        let reaper = RevisionReaper::new(Arc::clone(&platform), pool.clone(), &config.service_id);
        let tagger = RevisionTagger::new(
            Arc::clone(&store),
            Arc::clone(&platform),
            pool.clone(),
            &config.service_id,
        );

        Self {
            store,
            manifest,
            pruner,
            collector,
            reaper,
            tagger,
            platform,
            pool,
            service_id: config.service_id,
            timeout: config.timeout,
            default_keep: config.default_keep,
        }
    }

    pub fn tagger(&self) -> &RevisionTagger {
        &self.tagger
    }

    /// Upper bound callers should apply to a whole run.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn default_keep(&self) -> KeepCount {
        self.default_keep
    }

    /// Run a cleanup. Never fails; remote errors land in the report.
    pub async fn cleanup(&self, keep: KeepCount, options: CleanupOptions) -> CleanupReport {
        let CleanupOptions {
            dry_run,
            delete_revisions,
        } = options;
        let mut report = CleanupReport::new(keep, dry_run);
        let mut phase = CleanupPhase::Start;
        info!(service = %self.service_id, keep = %keep, dry_run, delete_revisions, "cleanup started");

        self.enter(&mut phase, CleanupPhase::ManifestRead);
        let entries = match self.manifest.read().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "manifest read failed, nothing to reconcile against");
                report.errors.push(e.to_string());
                report.notice = Some(NOTICE_MANIFEST_UNAVAILABLE.to_string());
                self.enter(&mut phase, CleanupPhase::Done);
                return report;
            }
        };
        report.total_entries = entries.len();
        if entries.is_empty() {
            info!("manifest is empty, nothing to reconcile");
            report.notice = Some(NOTICE_EMPTY_MANIFEST.to_string());
            self.enter(&mut phase, CleanupPhase::Done);
            return report;
        }

        let retention = RetentionPolicy::new(keep).compute(&entries);
        self.enter(&mut phase, CleanupPhase::PolicyComputed);
        report.revisions_kept = retention.set.to_vec();
        report.revisions_removed = dropped_revisions(&entries, &retention.set);
        report.safeguards = retention.safeguards.clone();

        self.enter(&mut phase, CleanupPhase::Reclaiming);
        let (pruned, collected) = tokio::join!(
            self.pruner.prune(&retention.set, dry_run),
            self.collector.collect(&retention.set, dry_run),
        );
        let routed = match pruned {
            Ok(plan) => {
                report.tags_removed = plan.removed_tags();
                Some(plan.keep)
            }
            Err(e) => {
                warn!(error = %e, "routing pruning failed");
                report.errors.push(e.to_string());
                None
            }
        };
        match collected {
            Ok(GcOutcome {
                deleted,
                kept,
                errors,
            }) => {
                report.metadata_files_deleted = deleted;
                report.metadata_files_kept = kept;
                report.errors.extend(errors);
            }
            Err(e) => {
                warn!(error = %e, "metadata collection failed");
                report.errors.push(e.to_string());
            }
        }

        if delete_revisions {
            self.enter(&mut phase, CleanupPhase::RevisionDelete);
            match routed {
                // Without a settled routing table nothing is known to be unrouted.
                None => warn!("routing not pruned, revision deletion skipped"),
                Some(routed) => match self.reaper.reap(&retention.set, &routed, dry_run).await {
                    Ok(ReapOutcome { deleted, errors }) => {
                        report.revisions_deleted = deleted;
                        report.errors.extend(errors);
                    }
                    Err(e) => {
                        warn!(error = %e, "revision deletion failed");
                        report.errors.push(e.to_string());
                    }
                },
            }
        }

        self.enter(&mut phase, CleanupPhase::ManifestRewrite);
        let retained: Vec<_> = entries
            .iter()
            .filter(|e| retention.set.contains(&e.revision))
            .cloned()
            .collect();
        if retained.len() == entries.len() {
            debug!("every manifest entry retained, manifest left as is");
        } else if dry_run {
            debug!(
                dropping = entries.len() - retained.len(),
                "dry run, manifest left as is"
            );
        } else if let Err(e) = self.manifest.write(&retained).await {
            warn!(error = %e, "manifest rewrite failed");
            report.errors.push(e.to_string());
        }

        self.enter(&mut phase, CleanupPhase::Done);
        info!(
            service = %self.service_id,
            kept = report.revisions_kept.len(),
            tags_removed = report.tags_removed.len(),
            files_deleted = report.metadata_files_deleted.len(),
            revisions_deleted = report.revisions_deleted.len(),
            errors = report.errors.len(),
            dry_run,
            "cleanup complete"
        );
        report
    }

    /// Same pipeline as [`cleanup`](Self::cleanup) with every mutation disabled.
    pub async fn preview(&self, keep: KeepCount, delete_revisions: bool) -> CleanupReport {
        let options = CleanupOptions {
            dry_run: true,
            delete_revisions,
        };
        self.cleanup(keep, options).await
    }

    /// Record a successful deployment.
    ///
    /// Appends `entry` to the manifest, then writes one metadata file per
    /// bundled country version pointing at the entry's revision.
    pub async fn record(&self, entry: DeploymentEntry) -> Result<RecordedDeployment, CleanupError> {
        let revision = entry.revision.clone();
        let files: Vec<(String, serde_json::Value)> = Country::ALL
            .into_iter()
            .filter(|c| !entry.version_for(*c).is_empty())
            .map(|c| {
                let version = entry.version_for(c);
                (
                    metadata_key(c.as_str(), version),
                    serde_json::json!({ "revision": revision, "model_version": version }),
                )
            })
            .collect();

        let entries = self.manifest.append(entry).await?;

        let mut written = Vec::with_capacity(files.len());
        for (key, body) in files {
            let bytes = body.to_string().into_bytes();
            let store = Arc::clone(&self.store);
            let target = key.clone();
            self.pool
                .run(move || store.put(&target, &bytes))
                .await?
                .map_err(|source| CleanupError::MetadataWrite {
                    key: key.clone(),
                    source,
                })?;
            debug!(key = %key, revision = %revision, "metadata written");
            written.push(key);
        }

        info!(revision = %revision, entries, files = written.len(), "deployment recorded");
        Ok(RecordedDeployment {
            revision,
            entries,
            metadata_files_written: written,
        })
    }

    /// Collect metadata against the revisions that currently exist on the
    /// platform, without touching routing or the manifest.
    pub async fn sweep_orphans(&self) -> OrphanSweepReport {
        let mut report = OrphanSweepReport::default();

        let platform = Arc::clone(&self.platform);
        let service = self.service_id.clone();
        let listed = match self.pool.run(move || platform.list_revisions(&service)).await {
            Ok(Ok(records)) => records,
            Ok(Err(source)) => {
                let e = CleanupError::RevisionList {
                    service: self.service_id.clone(),
                    source,
                };
                warn!(error = %e, "revision listing failed, sweep skipped");
                report.errors.push(e.to_string());
                return report;
            }
            Err(e) => {
                warn!(error = %e, "revision listing failed, sweep skipped");
                report.errors.push(e.to_string());
                return report;
            }
        };

        let existing: RetentionSet = listed.iter().map(|r| r.name.as_str()).collect();
        if existing.is_empty() {
            let msg = format!(
                "no revisions listed for {}; refusing to sweep against an empty set",
                self.service_id
            );
            warn!("{msg}");
            report.errors.push(msg);
            return report;
        }
        report.existing_revisions = existing.to_vec();

        match self.collector.collect(&existing, false).await {
            Ok(outcome) => {
                report.metadata_files_deleted = outcome.deleted;
                report.metadata_files_kept = outcome.kept;
                report.errors.extend(outcome.errors);
            }
            Err(e) => {
                warn!(error = %e, "metadata collection failed");
                report.errors.push(e.to_string());
            }
        }
        info!(
            existing = report.existing_revisions.len(),
            deleted = report.metadata_files_deleted.len(),
            errors = report.errors.len(),
            "orphan sweep complete"
        );
        report
    }

    fn enter(&self, phase: &mut CleanupPhase, next: CleanupPhase) {
        debug!(service = %self.service_id, from = %phase, to = %next, "cleanup phase");
        *phase = next;
    }
}

/// Distinct normalized revisions of `entries` not in `retained`.
fn dropped_revisions(entries: &[DeploymentEntry], retained: &RetentionSet) -> Vec<String> {
    entries
        .iter()
        .map(|e| normalize_revision(&e.revision))
        .filter(|r| !retained.contains(r))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

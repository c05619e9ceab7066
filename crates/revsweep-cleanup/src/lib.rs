//! revsweep cleanup engine: retention, traffic pruning, metadata GC.
//!
//! Given the deployment manifest and a keep count, the engine decides which
//! revisions stay reachable and reclaims everything else: zero-traffic
//! routing tags and the per-version metadata files pointing at dropped
//! revisions. Partial remote failures are reported, never raised.
//!
//! # Components
//!
//! - **`offload`**: bounded gateway from async code to blocking collaborators
//! - **`manifest`**: manifest read, atomic rewrite, append
//! - **`policy`**: recency window plus per-country newest-version safeguards
//! - **`pruner`**: single-update removal of unretained zero-traffic tags
//! - **`collector`**: concurrent, continue-on-error metadata deletion
//! - **`reaper`**: optional deletion of revisions nothing routes to
//! - **`orchestrator`**: the cleanup run, preview, orphan sweep, and deployment recording
//! - **`tagger`**: tag a country model version's revision on demand

pub mod collector;
pub mod error;
pub mod manifest;
pub mod offload;
pub mod orchestrator;
pub mod policy;
pub mod pruner;
pub mod reaper;
pub mod tagger;

#[cfg(test)]
mod testing;

pub use collector::{GcOutcome, MetadataCollector};
pub use error::{CleanupError, OffloadError};
pub use manifest::Manifest;
pub use offload::BlockingPool;
pub use orchestrator::{
    CleanupEngine, CleanupOptions, CleanupPhase, CleanupReport, EngineConfig,
    NOTICE_EMPTY_MANIFEST, NOTICE_MANIFEST_UNAVAILABLE, OrphanSweepReport, RecordedDeployment,
};
pub use policy::{Retention, RetentionPolicy, RetentionSet, Safeguard};
pub use pruner::{PrunePlan, TrafficPruner};
pub use reaper::{ReapOutcome, RevisionReaper};
pub use tagger::RevisionTagger;

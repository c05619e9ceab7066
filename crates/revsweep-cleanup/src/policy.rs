//! Retention policy: which revisions must survive a cleanup run.
//!
//! Recency alone is not enough: a stale deployment re-applied late, or
//! deployments run out of order, can push the newest model version of a
//! country out of the `keep` window. After seeding the set with the most
//! recent deployments, one safeguard per country adds the revision carrying
//! the highest version of that country's package.

use std::collections::BTreeSet;

use revsweep_core::{Country, DeploymentEntry, KeepCount, compare_versions, normalize_revision};
use serde::Serialize;
use tracing::{debug, info};

/// Normalized revision names that must stay reachable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionSet(BTreeSet<String>);

impl RetentionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a revision (either form). Returns true if it was not yet present.
    pub fn insert(&mut self, revision: &str) -> bool {
        self.0.insert(normalize_revision(revision).to_string())
    }

    /// Membership test on the normalized form of `revision`.
    pub fn contains(&self, revision: &str) -> bool {
        self.0.contains(normalize_revision(revision))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for RetentionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = RetentionSet::new();
        for revision in iter {
            set.insert(revision.as_ref());
        }
        set
    }
}

/// A revision retained because it carries a country's newest version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Safeguard {
    pub country: Country,
    pub version: String,
    pub revision: String,
    /// False when the revision was already inside the recency window.
    pub added: bool,
}

/// Outcome of applying the policy to a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Retention {
    pub set: RetentionSet,
    /// Revisions of the `keep` most recent deployments, newest first.
    pub recent: Vec<String>,
    pub safeguards: Vec<Safeguard>,
}

/// Keep the `keep` most recent deployments plus the per-country safeguards.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    keep: KeepCount,
}

impl RetentionPolicy {
    pub fn new(keep: KeepCount) -> Self {
        Self { keep }
    }

    pub fn compute(&self, entries: &[DeploymentEntry]) -> Retention {
        let mut sorted: Vec<&DeploymentEntry> = entries.iter().collect();
        // Stable, so equal timestamps keep manifest order.
        sorted.sort_by(|a, b| b.deployed_at.cmp(&a.deployed_at));

        let mut retention = Retention::default();

        for entry in sorted.iter().take(self.keep.get()) {
            let revision = normalize_revision(&entry.revision).to_string();
            if retention.set.insert(&revision) {
                debug!(revision = %revision, deployed_at = %entry.deployed_at, "retained by recency");
            }
            retention.recent.push(revision);
        }

        for country in Country::ALL {
            let Some(newest) = newest_for(country, &sorted) else {
                debug!(%country, "no versions recorded, no safeguard");
                continue;
            };
            let revision = normalize_revision(&newest.revision).to_string();
            let version = newest.version_for(country).to_string();
            let added = retention.set.insert(&revision);
            if added {
                info!(
                    %country,
                    version = %version,
                    revision = %revision,
                    "safeguard retained revision outside recency window"
                );
            } else {
                debug!(%country, version = %version, revision = %revision, "safeguard already retained");
            }
            retention.safeguards.push(Safeguard {
                country,
                version,
                revision,
                added,
            });
        }

        info!(
            entries = entries.len(),
            keep = %self.keep,
            retained = retention.set.len(),
            "retention computed"
        );
        retention
    }
}

/// Entry with the highest `country` version; ties go to the earliest in
/// `sorted` (the most recent deployment).
fn newest_for<'a>(country: Country, sorted: &[&'a DeploymentEntry]) -> Option<&'a DeploymentEntry> {
    let mut best: Option<&'a DeploymentEntry> = None;
    for entry in sorted.iter().copied() {
        let version = entry.version_for(country);
        if version.is_empty() {
            continue;
        }
        let better = match best {
            None => true,
            Some(current) => {
                compare_versions(version, current.version_for(country)).is_gt()
            }
        };
        if better {
            best = Some(entry);
        }
    }
    best
}

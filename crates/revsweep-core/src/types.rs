//! Domain types shared across revsweep crates.
//!
//! Everything that crosses a storage or routing boundary is a serde record
//! with explicit optional fields, so schema drift in remote documents shows
//! up as `None`/empty values rather than as decode failures.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ── Countries ──────────────────────────────────────────────────────

/// The two independently-versioned model packages bundled per revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Country {
    Us,
    Uk,
}

impl Country {
    pub const ALL: [Country; 2] = [Country::Us, Country::Uk];

    pub fn as_str(&self) -> &'static str {
        match self {
            Country::Us => "us",
            Country::Uk => "uk",
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Country {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "us" => Ok(Country::Us),
            "uk" => Ok(Country::Uk),
            _ => Err(ValidationError::Country(s.to_string())),
        }
    }
}

// ── Manifest ───────────────────────────────────────────────────────

/// One successful deployment, as appended by the deploy process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentEntry {
    /// Short revision name or fully-qualified resource path.
    pub revision: String,
    /// US model package version, empty if not bundled.
    #[serde(default)]
    pub us_version: String,
    /// UK model package version, empty if not bundled.
    #[serde(default)]
    pub uk_version: String,
    pub deployed_at: DateTime<Utc>,
}

impl DeploymentEntry {
    /// A deployment about to be recorded. Blank versions mean the country
    /// package was not bundled; a blank revision is rejected.
    pub fn new(
        revision: &str,
        us_version: &str,
        uk_version: &str,
        deployed_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let revision = revision.trim();
        if revision.is_empty() {
            return Err(ValidationError::EmptyRevision);
        }
        Ok(Self {
            revision: revision.to_string(),
            us_version: us_version.trim().to_string(),
            uk_version: uk_version.trim().to_string(),
            deployed_at,
        })
    }

    pub fn version_for(&self, country: Country) -> &str {
        match country {
            Country::Us => &self.us_version,
            Country::Uk => &self.uk_version,
        }
    }
}

/// On-store representation of the manifest.
///
/// Older writers stored a bare array; both shapes are accepted on read and
/// the wrapped shape is always written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManifestDocument {
    Wrapped { deployments: Vec<DeploymentEntry> },
    Bare(Vec<DeploymentEntry>),
}

impl ManifestDocument {
    pub fn new(deployments: Vec<DeploymentEntry>) -> Self {
        ManifestDocument::Wrapped { deployments }
    }

    pub fn into_entries(self) -> Vec<DeploymentEntry> {
        match self {
            ManifestDocument::Wrapped { deployments } => deployments,
            ManifestDocument::Bare(deployments) => deployments,
        }
    }
}

// ── Metadata ───────────────────────────────────────────────────────

/// The part of a per-version metadata file the collector cares about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataBody {
    #[serde(default)]
    pub revision: Option<String>,
}

impl MetadataBody {
    /// Revision reference, if present and non-empty.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref().filter(|r| !r.is_empty())
    }
}

// ── Routing ────────────────────────────────────────────────────────

/// One reachable revision in a service's routing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub revision: String,
    #[serde(default)]
    pub tag: Option<String>,
    /// Share of live traffic (0–100). Zero means tag-only addressing.
    #[serde(default)]
    pub percent: u32,
}

impl RoutingEntry {
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref().filter(|t| !t.is_empty())
    }

    pub fn serves_traffic(&self) -> bool {
        self.percent > 0
    }
}

/// Routing configuration for one service, as owned by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Base URI of the service.
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub entries: Vec<RoutingEntry>,
}

/// A revision that currently exists on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// ── Retention knob ─────────────────────────────────────────────────

/// Number of most-recent deployments to retain. Always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct KeepCount(NonZeroU32);

impl KeepCount {
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if value < 1 {
            return Err(ValidationError::KeepCount(value));
        }
        u32::try_from(value)
            .ok()
            .and_then(NonZeroU32::new)
            .map(KeepCount)
            .ok_or(ValidationError::KeepCountTooLarge(value))
    }

    pub fn get(self) -> usize {
        self.0.get() as usize
    }
}

impl TryFrom<i64> for KeepCount {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        KeepCount::new(value)
    }
}

impl From<KeepCount> for u32 {
    fn from(keep: KeepCount) -> Self {
        keep.0.get()
    }
}

impl fmt::Display for KeepCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

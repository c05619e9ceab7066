//! Naming conventions: revision normalization, metadata keys, traffic tags.

use std::sync::OnceLock;

use regex::Regex;

/// Reduce a revision reference to its short name.
///
/// `projects/p/locations/r/services/s/revisions/rev-1` and `rev-1` both
/// normalize to `rev-1`.
pub fn normalize_revision(revision: &str) -> &str {
    match revision.rsplit_once('/') {
        Some((_, name)) => name,
        None => revision,
    }
}

/// Object key of the metadata file for a deployed (country, version) pair.
pub fn metadata_key(country: &str, version: &str) -> String {
    format!("{country}.{version}.json")
}

/// Split a metadata key back into `(country, version)`.
///
/// Returns `None` for keys that do not follow `{country}.{version}.json`,
/// including the reserved pointer and manifest objects. Versions start with
/// a digit and may carry pre-release suffixes (`1.0.0-rc1`).
pub fn parse_metadata_key(key: &str) -> Option<(&str, &str)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"^([a-z]{2})\.(\d[0-9A-Za-z.+-]*)\.json$").expect("metadata key pattern")
    });
    let caps = re.captures(key)?;
    let country = caps.get(1)?.as_str();
    let version = caps.get(2)?.as_str();
    Some((country, version))
}

/// Traffic tag for a country model version: `country-us-model-1-459-0`.
pub fn tag_name(country: &str, version: &str) -> String {
    format!("country-{country}-model-{}", version.replace('.', "-"))
}

//! Ordering for dotted-numeric package versions (`"1.459.0"`).

use std::cmp::Ordering;

/// Compare two dotted-numeric version strings.
///
/// Segments are compared numerically after right-padding the shorter
/// version with zeros, so `"1.2"` equals `"1.2.0"`. If any segment of
/// either string is not a non-negative integer, the whole strings are
/// compared lexicographically instead.
///
/// The fallback keeps the ordering total and antisymmetric, but it is only
/// transitive among all-numeric versions: `"1.9" < "1.10"` numerically while
/// `"1.10" < "1.5x" < "1.9"` lexically.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_segments(a), parse_segments(b)) {
        (Some(left), Some(right)) => {
            let len = left.len().max(right.len());
            for i in 0..len {
                let l = left.get(i).copied().unwrap_or(0);
                let r = right.get(i).copied().unwrap_or(0);
                match l.cmp(&r) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            Ordering::Equal
        }
        _ => a.cmp(b),
    }
}

fn parse_segments(version: &str) -> Option<Vec<u64>> {
    version
        .split('.')
        .map(|segment| segment.parse::<u64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_segments_compare_numerically() {
        assert_eq!(compare_versions("1.459.0", "1.46.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.9.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare_versions("2.65.9", "2.65.9"), Ordering::Equal);
    }

    #[test]
    fn shorter_version_is_zero_padded() {
        assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.2", "1.2.1"), Ordering::Less);
        assert_eq!(compare_versions("2", "1.99.99"), Ordering::Greater);
    }

    #[test]
    fn non_numeric_falls_back_to_string_order() {
        assert_eq!(compare_versions("1.0.0-beta", "1.0.0"), Ordering::Greater);
        assert_eq!(compare_versions("abc", "abd"), Ordering::Less);
        assert_eq!(compare_versions("", "1.0"), Ordering::Less);
    }

    #[test]
    fn overflowing_segment_does_not_panic() {
        let huge = "1.99999999999999999999999";
        assert_eq!(compare_versions(huge, huge), Ordering::Equal);
        assert_eq!(compare_versions(huge, "1.0"), huge.cmp("1.0"));
    }

    #[test]
    fn ordering_is_antisymmetric() {
        let versions = ["0.9", "1.0", "1.0.1", "1.10", "1.5x", "1.9.9", "2", "x.y"];
        for a in versions {
            for b in versions {
                assert_eq!(compare_versions(a, b), compare_versions(b, a).reverse(), "{a} {b}");
            }
        }
    }

    #[test]
    fn numeric_ordering_is_transitive() {
        let versions = ["0.9", "1", "1.0", "1.0.1", "1.9", "1.9.9", "1.10", "2", "10.0"];
        for a in versions {
            for b in versions {
                for c in versions {
                    if compare_versions(a, b) != Ordering::Greater
                        && compare_versions(b, c) != Ordering::Greater
                    {
                        assert_ne!(compare_versions(a, c), Ordering::Greater, "{a} {b} {c}");
                    }
                }
            }
        }
    }

    #[test]
    fn mixed_inputs_can_cycle() {
        assert_eq!(compare_versions("1.9", "1.10"), Ordering::Less);
        assert_eq!(compare_versions("1.10", "1.5x"), Ordering::Less);
        assert_eq!(compare_versions("1.5x", "1.9"), Ordering::Less);
    }
}

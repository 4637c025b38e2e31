//! Version queries over a package document.
//!
//! Keys of the `versions` map are parsed the way npm's `semver.valid` does:
//! surrounding whitespace and a single leading `v` are ignored. Keys that
//! still fail to parse are never considered.

use std::collections::BTreeMap;

use semver::{Version, VersionReq};

use crate::document::{PackageDocument, VersionMetadata};

const LATEST: &str = "latest";

/// Parses a `versions` key, accepting npm's `v1.2.3` spelling.
pub fn parse_version(key: &str) -> Option<Version> {
    let trimmed = key.trim();
    Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed)).ok()
}

pub fn is_valid_version(key: &str) -> bool {
    parse_version(key).is_some()
}

/// Resolves a version query against `doc`.
///
/// In order: `latest` picks the highest valid version, an exact key wins,
/// a dist-tag name maps to its tagged version, and anything else is treated
/// as an npm-style range whose highest match is returned.
pub fn resolve_version<'a>(doc: &'a PackageDocument, query: &str) -> Option<&'a VersionMetadata> {
    let key = resolve_version_key(&doc.versions, &doc.dist_tags, query)?;
    doc.versions.get(key)
}

/// Same as [`resolve_version`] but returns the matching `versions` key.
pub fn resolve_version_key<'a, V>(
    versions: &'a BTreeMap<String, V>,
    dist_tags: &BTreeMap<String, String>,
    query: &str,
) -> Option<&'a str> {
    let query = query.trim();

    if query == LATEST {
        return highest(versions.keys().map(String::as_str));
    }

    if let Some((key, _)) = versions.get_key_value(query) {
        return Some(key.as_str());
    }

    if let Some(tagged) = dist_tags.get(query) {
        if let Some((key, _)) = versions.get_key_value(tagged.as_str()) {
            return Some(key.as_str());
        }
    }

    let reqs = parse_range(query)?;
    highest(
        versions
            .keys()
            .map(String::as_str)
            .filter(|key| parse_version(key).is_some_and(|v| reqs.iter().any(|r| r.matches(&v)))),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stability {
    Other,
    Alpha,
    Beta,
    Stable,
}

/// Only a plain `MAJOR.MINOR.PATCH` key is stable; `v1.0.0` ranks with
/// the unclassified versions.
fn stability(key: &str, version: &Version) -> Stability {
    let plain = key.bytes().next().is_some_and(|b| b.is_ascii_digit());
    if version.pre.is_empty() && version.build.is_empty() {
        if plain {
            Stability::Stable
        } else {
            Stability::Other
        }
    } else if version.pre.as_str().contains("beta") {
        Stability::Beta
    } else if version.pre.as_str().contains("alpha") {
        Stability::Alpha
    } else {
        Stability::Other
    }
}

/// Computes the version the `latest` dist-tag should point at.
///
/// Highest stable release first, then highest beta, then highest alpha,
/// then the highest valid version of any kind. `None` when no key is a
/// valid version.
pub fn compute_latest_tag<V>(versions: &BTreeMap<String, V>) -> Option<String> {
    let mut best_overall: Option<(&str, Version)> = None;
    let mut best_ranked: Option<(Stability, Version, &str)> = None;

    for key in versions.keys() {
        let Some(version) = parse_version(key) else {
            continue;
        };

        let class = stability(key.trim(), &version);
        if class != Stability::Other
            && best_ranked
                .as_ref()
                .is_none_or(|(c, v, _)| (class, &version) > (*c, v))
        {
            best_ranked = Some((class, version.clone(), key));
        }

        if best_overall.as_ref().is_none_or(|(_, v)| version > *v) {
            best_overall = Some((key, version));
        }
    }

    best_ranked
        .map(|(_, _, key)| key)
        .or(best_overall.map(|(key, _)| key))
        .map(str::to_string)
}

fn highest<'a>(keys: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    keys.filter_map(|key| parse_version(key).map(|v| (v, key)))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, key)| key)
}

/// Translates an npm range into alternatives understood by `semver`.
///
/// Handles `||` alternatives, hyphen ranges, space separated comparators
/// and `x`/`*` wildcards. A bare version like `1.2` means `1.2.x`, as in
/// npm, rather than the caret range `semver` would assume.
pub fn parse_range(range: &str) -> Option<Vec<VersionReq>> {
    range
        .split("||")
        .map(|alternative| {
            let translated = translate_alternative(alternative.trim())?;
            VersionReq::parse(&translated).ok()
        })
        .collect()
}

fn translate_alternative(alternative: &str) -> Option<String> {
    if alternative.is_empty() {
        return Some("*".to_string());
    }

    if let Some((low, high)) = alternative.split_once(" - ") {
        let low = normalize_partial(low.trim())?;
        let high = normalize_partial(high.trim())?;
        return Some(match (low.is_empty(), high.is_empty()) {
            (true, true) => "*".to_string(),
            (true, false) => format!("<={high}"),
            (false, true) => format!(">={low}"),
            (false, false) => format!(">={low}, <={high}"),
        });
    }

    let mut comparators = Vec::new();
    let mut pending_op = String::new();

    for token in alternative.split_whitespace() {
        let op_len = token
            .find(|c: char| !matches!(c, '<' | '>' | '=' | '~' | '^'))
            .unwrap_or(token.len());
        let (op, rest) = token.split_at(op_len);

        if rest.is_empty() {
            pending_op.push_str(op);
            continue;
        }

        let op = format!("{pending_op}{op}");
        pending_op.clear();
        comparators.push(translate_comparator(&op, rest)?);
    }

    if !pending_op.is_empty() {
        return None;
    }

    Some(comparators.join(", "))
}

fn translate_comparator(op: &str, version: &str) -> Option<String> {
    let version = normalize_partial(version)?;
    if version.is_empty() {
        return Some(match op {
            "<" | ">" => "<0.0.0-0".to_string(),
            _ => "*".to_string(),
        });
    }

    let op = match op {
        "" | "=" | "==" => "=",
        other => other,
    };
    Some(format!("{op}{version}"))
}

/// Strips a leading `v` and cuts the version at its first wildcard part.
///
/// `1.x.x` becomes `1`, `*` becomes an empty string.
fn normalize_partial(version: &str) -> Option<String> {
    let version = version.strip_prefix('v').unwrap_or(version);
    let (core, suffix) = match version.find(['-', '+']) {
        Some(idx) => version.split_at(idx),
        None => (version, ""),
    };

    let mut parts = Vec::new();
    for part in core.split('.') {
        if matches!(part, "x" | "X" | "*") {
            return Some(parts.join("."));
        }
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        parts.push(part);
    }

    if parts.len() > 3 || (!suffix.is_empty() && parts.len() != 3) {
        return None;
    }
    Some(format!("{}{suffix}", parts.join(".")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(keys: &[&str]) -> BTreeMap<String, ()> {
        keys.iter().map(|k| (k.to_string(), ())).collect()
    }

    fn resolve<'a>(keys: &'a BTreeMap<String, ()>, query: &str) -> Option<&'a str> {
        resolve_version_key(keys, &BTreeMap::new(), query)
    }

    #[test]
    fn test_latest_prefers_stable_over_prerelease() {
        let v = versions(&["1.0.0", "2.0.0-beta.1", "3.0.0-alpha.1"]);
        assert_eq!(compute_latest_tag(&v).as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_latest_prefers_beta_over_alpha() {
        let v = versions(&["2.0.0-beta.2", "2.0.0-beta.1", "1.0.0-alpha.1"]);
        assert_eq!(compute_latest_tag(&v).as_deref(), Some("2.0.0-beta.2"));
    }

    #[test]
    fn test_latest_falls_back_to_highest() {
        let v = versions(&["1.2.3-rc.1"]);
        assert_eq!(compute_latest_tag(&v).as_deref(), Some("1.2.3-rc.1"));

        let v = versions(&["1.0.0-rc.1", "1.0.0-rc.2", "0.9.0-alpha"]);
        assert_eq!(compute_latest_tag(&v).as_deref(), Some("0.9.0-alpha"));
    }

    #[test]
    fn test_latest_uses_semver_ordering() {
        let v = versions(&["1.9.0", "1.10.0", "1.2.0"]);
        assert_eq!(compute_latest_tag(&v).as_deref(), Some("1.10.0"));
    }

    #[test]
    fn test_latest_build_metadata_is_not_stable() {
        let v = versions(&["1.0.0", "2.0.0+build.5"]);
        assert_eq!(compute_latest_tag(&v).as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_latest_empty_or_invalid() {
        assert_eq!(compute_latest_tag(&versions(&[])), None);
        assert_eq!(compute_latest_tag(&versions(&["banana", "1.0"])), None);
    }

    #[test]
    fn test_resolve_latest_is_highest_overall() {
        let v = versions(&["1.0.0", "2.0.0-beta.1", "not-a-version"]);
        assert_eq!(resolve(&v, "latest"), Some("2.0.0-beta.1"));
    }

    #[test]
    fn test_resolve_exact() {
        let v = versions(&["1.0.0", "1.0.1", "2.0.0"]);
        for key in v.keys() {
            assert_eq!(resolve(&v, key), Some(key.as_str()));
        }
        assert_eq!(resolve(&v, "3.0.0"), None);
    }

    #[test]
    fn test_resolve_partial_versions() {
        let v = versions(&["1.2.3", "1.2.4", "1.3.0", "2.0.0"]);
        assert_eq!(resolve(&v, "1"), Some("1.3.0"));
        assert_eq!(resolve(&v, "1.2"), Some("1.2.4"));
        assert_eq!(resolve(&v, "1.2.x"), Some("1.2.4"));
        assert_eq!(resolve(&v, "*"), Some("2.0.0"));
        assert_eq!(resolve(&v, ""), Some("2.0.0"));
    }

    #[test]
    fn test_resolve_ranges() {
        let v = versions(&["1.2.3", "1.4.0", "2.0.0", "2.1.0", "3.0.0-beta.1"]);
        assert_eq!(resolve(&v, "^1.2.0"), Some("1.4.0"));
        assert_eq!(resolve(&v, "~1.2.0"), Some("1.2.3"));
        assert_eq!(resolve(&v, ">=1.0.0 <2.0.0"), Some("1.4.0"));
        assert_eq!(resolve(&v, ">= 2.0.0"), Some("2.1.0"));
        assert_eq!(resolve(&v, "^1.0.0 || ^2.0.0"), Some("2.1.0"));
        assert_eq!(resolve(&v, "1.2.0 - 1.9.9"), Some("1.4.0"));
        assert_eq!(resolve(&v, "^4.0.0"), None);
        assert_eq!(resolve(&v, "not a range"), None);
    }

    #[test]
    fn test_bare_version_is_not_caret() {
        let v = versions(&["1.2.4"]);
        assert_eq!(resolve(&v, "1.2.3"), None);
    }

    #[test]
    fn test_resolve_dist_tag() {
        let v = versions(&["1.0.0", "2.0.0-rc.1"]);
        let tags: BTreeMap<String, String> =
            [("next".to_string(), "2.0.0-rc.1".to_string())].into();
        assert_eq!(resolve_version_key(&v, &tags, "next"), Some("2.0.0-rc.1"));

        let dangling: BTreeMap<String, String> =
            [("next".to_string(), "9.9.9".to_string())].into();
        assert_eq!(resolve_version_key(&v, &dangling, "next"), None);
    }

    #[test]
    fn test_parse_version_accepts_single_v() {
        assert_eq!(parse_version("v1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_version(" 1.2.3 "), Some(Version::new(1, 2, 3)));
        assert!(parse_version("1.2").is_none());
        assert!(!is_valid_version("latest"));
    }

    #[test]
    fn test_parse_version_rejects_operator_prefixes() {
        for key in ["=1.0.0", "vv1.0.0", "v=v1.0.0", "==2.0.0", "=v1.0.0"] {
            assert!(!is_valid_version(key), "{key} should be invalid");
        }
    }

    #[test]
    fn test_latest_ignores_operator_prefixed_keys() {
        let v = versions(&["1.0.0", "==2.0.0"]);
        assert_eq!(compute_latest_tag(&v).as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_latest_v_prefix_is_not_stable() {
        let v = versions(&["1.0.0", "v2.0.0"]);
        assert_eq!(compute_latest_tag(&v).as_deref(), Some("1.0.0"));

        let v = versions(&["v2.0.0", "1.0.0-beta.1"]);
        assert_eq!(compute_latest_tag(&v).as_deref(), Some("1.0.0-beta.1"));

        let v = versions(&["v2.0.0"]);
        assert_eq!(compute_latest_tag(&v).as_deref(), Some("v2.0.0"));
    }

    #[test]
    fn test_normalize_partial() {
        assert_eq!(normalize_partial("1.x.x").as_deref(), Some("1"));
        assert_eq!(normalize_partial("*").as_deref(), Some(""));
        assert_eq!(normalize_partial("v2.0.0-beta.1").as_deref(), Some("2.0.0-beta.1"));
        assert_eq!(normalize_partial("1.2-beta"), None);
        assert_eq!(normalize_partial("banana"), None);
    }
}

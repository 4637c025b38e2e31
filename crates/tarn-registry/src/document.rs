use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::version::{compute_latest_tag, is_valid_version};

/// Identifier of a cached tarball: `name-version`, scope included.
///
/// # Example
///
/// ```
/// use tarn_registry::tarball_id;
///
/// assert_eq!(tarball_id("left-pad", "1.3.0"), "left-pad-1.3.0");
/// assert_eq!(tarball_id("@babel/core", "7.0.0"), "@babel/core-7.0.0");
/// ```
pub fn tarball_id(name: &str, version: &str) -> String {
    format!("{name}-{version}")
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Download information of a single release.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Dist {
    #[serde(default)]
    pub tarball: String,

    /// Expected SHA-1 of the archive, hex encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Metadata of one published version. Everything but `dist` is carried through.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VersionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub dist: Dist,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A package document as served by an npm-style registry.
///
/// Fields the mirror doesn't interpret are kept in `extra` and written back
/// untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PackageDocument {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Store revision, only meaningful for conditional writes.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub versions: BTreeMap<String, VersionMetadata>,

    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,

    #[serde(default)]
    pub time: Map<String, Value>,

    /// Set on documents created by a first lazy import. Their `versions`
    /// map only holds the upstream `latest` release.
    #[serde(rename = "firstimport", default, skip_serializing_if = "is_false")]
    pub first_import: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PackageDocument {
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// `time.modified`, if present and parseable.
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.time
            .get("modified")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Whether this (upstream) copy is at least as fresh as `local`.
    ///
    /// A copy without a usable timestamp never beats one that has it.
    pub fn is_fresher_or_equal(&self, local: &PackageDocument) -> bool {
        match (self.modified_at(), local.modified_at()) {
            (Some(remote), Some(local)) => remote >= local,
            (Some(_), None) | (None, None) => true,
            (None, Some(_)) => false,
        }
    }

    /// Drops `versions` entries whose key is not a valid version.
    ///
    /// Returns the number of removed entries.
    pub fn purge_invalid_versions(&mut self) -> usize {
        let before = self.versions.len();
        self.versions.retain(|key, _| is_valid_version(key));
        before - self.versions.len()
    }

    /// Points `dist.tarball` and `dist.info` of every version at `base`.
    pub fn rewrite_dist_urls(&mut self, base: &str) {
        let base = base.trim_end_matches('/');
        for (version, metadata) in self.versions.iter_mut() {
            metadata.dist.tarball = format!("{base}/tarballs/{}/{version}.tgz", self.name);
            metadata.dist.info = Some(format!("{base}/{}/{version}", self.name));
        }
    }

    /// Copy fit for serving from a mirror reachable at `base`.
    pub fn for_serving(&self, base: &str) -> Self {
        let mut served = self.clone();
        served.purge_invalid_versions();
        served.rewrite_dist_urls(base);
        served
    }

    /// Recomputes `dist-tags.latest` from the current `versions`.
    pub fn refresh_latest(&mut self) {
        if let Some(latest) = compute_latest_tag(&self.versions) {
            self.dist_tags.insert("latest".to_string(), latest);
        }
    }

    /// The version a first import keeps: the upstream `latest` tag when it
    /// points at a known version, else the computed one.
    pub fn import_version(&self) -> Option<String> {
        self.dist_tags
            .get("latest")
            .filter(|tag| self.versions.contains_key(tag.as_str()))
            .cloned()
            .or_else(|| compute_latest_tag(&self.versions))
    }

    /// Builds the trimmed document stored on a first lazy import.
    pub fn trimmed_for_import(&self) -> Self {
        let mut doc = self.clone();
        doc.revision = None;
        doc.purge_invalid_versions();

        if let Some(version) = doc.import_version() {
            doc.versions.retain(|key, _| *key == version);
            doc.dist_tags.insert("latest".to_string(), version);
        } else {
            doc.versions.clear();
        }

        doc.first_import = true;
        doc
    }

    /// Merges this upstream copy with the cached `local` document.
    ///
    /// Top-level fields come from upstream. `versions`, the import flag and
    /// the store revision stay local, and `latest` is recomputed over the
    /// local versions.
    pub fn merged_onto(&self, local: &PackageDocument) -> Self {
        let mut merged = self.clone();
        merged.versions = local.versions.clone();
        merged.first_import = local.first_import;
        merged.revision = local.revision.clone();
        merged.purge_invalid_versions();
        merged.refresh_latest();
        merged
    }

    /// Records a version whose tarball has just been cached.
    ///
    /// A first-import placeholder map is discarded before inserting.
    pub fn patch_version(&mut self, version: &str, metadata: VersionMetadata) {
        if self.first_import {
            self.versions.clear();
            self.first_import = false;
        }
        self.versions.insert(version.to_string(), metadata);
        self.refresh_latest();
    }

    pub fn shasum_of(&self, version: &str) -> Option<&str> {
        self.versions
            .get(version)
            .and_then(|meta| meta.dist.shasum.as_deref())
    }
}

//! Write-through tarball cache with integrity verification.

use std::sync::Arc;

use tarn_events::{EventSinkHandle, MirrorEvent, TarballOrigin};
use tarn_registry::{tarball_id, PackageDocument, VersionMetadata};
use tarn_utils::hash::{sha1_hex, verify_shasum};
use tracing::{debug, info, warn};

use crate::{
    error::MirrorError,
    reconcile::{write_with_retry, Reconciler},
    store::{TarballFetcher, TarballStore},
    MirrorResult,
};

/// Where the bytes of a [`Tarball`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarballSource {
    Upstream,
    Cache,
}

impl From<TarballSource> for TarballOrigin {
    fn from(source: TarballSource) -> Self {
        match source {
            TarballSource::Upstream => TarballOrigin::Upstream,
            TarballSource::Cache => TarballOrigin::Cache,
        }
    }
}

/// Verified archive bytes.
#[derive(Debug, Clone)]
pub struct Tarball {
    pub bytes: Vec<u8>,
    pub source: TarballSource,
}

pub struct TarballCache {
    reconciler: Arc<Reconciler>,
    store: Arc<dyn TarballStore>,
    fetcher: Arc<dyn TarballFetcher>,
    min_size: u64,
    events: EventSinkHandle,
}

impl TarballCache {
    pub fn new(
        reconciler: Arc<Reconciler>,
        store: Arc<dyn TarballStore>,
        fetcher: Arc<dyn TarballFetcher>,
        min_size: u64,
        events: EventSinkHandle,
    ) -> Self {
        Self {
            reconciler,
            store,
            fetcher,
            min_size,
            events,
        }
    }

    pub fn store(&self) -> &Arc<dyn TarballStore> {
        &self.store
    }

    /// Returns the archive of `name@version`.
    ///
    /// Upstream is tried first. Any upstream failure, including bytes that
    /// don't match the published shasum, falls back to the cached copy,
    /// which is served only if it passes the same checks.
    pub async fn fetch_tarball(&self, name: &str, version: &str) -> MirrorResult<Tarball> {
        let doc = self.reconciler.reconcile(name).await?;
        let metadata = doc.versions.get(version).cloned().ok_or_else(|| {
            MirrorError::VersionNotFound {
                name: name.to_string(),
                version: version.to_string(),
            }
        })?;

        let id = tarball_id(name, version);
        let expected = metadata.dist.shasum.clone().unwrap_or_default();

        let upstream_err = match self.fetcher.fetch(name, version).await {
            Ok(bytes) if verify_shasum(&bytes, &expected) => {
                self.store_upstream(name, version, &bytes, &doc, metadata).await;
                return Ok(self.serve(name, version, bytes, TarballSource::Upstream));
            }
            Ok(bytes) => {
                MirrorError::ChecksumMismatch {
                    id: id.clone(),
                    expected: expected.clone(),
                    actual: sha1_hex(&bytes),
                }
            }
            Err(err) => err,
        };

        warn!(name, version, "upstream tarball unavailable, trying cache: {upstream_err}");
        self.events.emit(MirrorEvent::TarballCacheFallback {
            name: name.to_string(),
            version: version.to_string(),
            reason: upstream_err.to_string(),
        });

        let bytes = match self.store.get(&id).await? {
            Some(bytes) => bytes,
            None => return Err(upstream_err),
        };

        let size = bytes.len() as u64;
        if size < self.min_size {
            return Err(MirrorError::CorruptCacheEntry {
                id,
                size,
            });
        }
        if !verify_shasum(&bytes, &expected) {
            return Err(MirrorError::ChecksumMismatch {
                id,
                expected,
                actual: sha1_hex(&bytes),
            });
        }

        Ok(self.serve(name, version, bytes, TarballSource::Cache))
    }

    fn serve(&self, name: &str, version: &str, bytes: Vec<u8>, source: TarballSource) -> Tarball {
        debug!(name, version, ?source, size = bytes.len(), "serving tarball");
        self.events.emit(MirrorEvent::TarballServed {
            name: name.to_string(),
            version: version.to_string(),
            origin: source.into(),
            size: bytes.len() as u64,
        });
        Tarball {
            bytes,
            source,
        }
    }

    /// Caches freshly downloaded bytes and records the version locally.
    ///
    /// Failures here never fail the download.
    async fn store_upstream(
        &self,
        name: &str,
        version: &str,
        bytes: &[u8],
        reconciled: &PackageDocument,
        metadata: VersionMetadata,
    ) {
        let id = tarball_id(name, version);
        match self.store.put(&id, bytes).await {
            Ok(true) => info!(name, version, size = bytes.len(), "cached tarball"),
            Ok(false) => debug!(%id, "tarball already cached"),
            Err(err) => warn!(%id, "failed to cache tarball: {err}"),
        }

        if let Err(err) = self.patch(name, version, reconciled, metadata).await {
            let err = MirrorError::PatchFailure {
                name: name.to_string(),
                reason: err.to_string(),
            };
            warn!(name, version, "{err}");
            self.events.emit(MirrorEvent::PatchFailed {
                name: name.to_string(),
                version: version.to_string(),
                error: err.to_string(),
            });
        }
    }

    async fn patch(
        &self,
        name: &str,
        version: &str,
        reconciled: &PackageDocument,
        metadata: VersionMetadata,
    ) -> MirrorResult<()> {
        let local = self.reconciler.local();
        let _guard = self.reconciler.locks().lock(name).await;

        let current = local.get(name).await?;
        write_with_retry(local.as_ref(), name, current, |current| {
            let mut doc = match current {
                Some(current) => current.clone(),
                None => reconciled.trimmed_for_import(),
            };
            doc.patch_version(version, metadata.clone());
            doc
        })
        .await?;

        debug!(name, version, "recorded cached version");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tarn_events::CollectorSink;
    use tarn_utils::keyed::KeyedLock;

    use super::*;
    use crate::{
        error::ErrorKind,
        store::DocumentStore,
        test_support::{memory_documents, memory_tarballs, package, StubFetcher, StubRemote},
    };

    const MIN_SIZE: u64 = 100;

    struct Fixture {
        local: Arc<dyn DocumentStore>,
        remote: Arc<StubRemote>,
        fetcher: Arc<StubFetcher>,
        store: Arc<dyn TarballStore>,
        events: Arc<CollectorSink>,
        cache: Arc<TarballCache>,
    }

    fn fixture() -> Fixture {
        let local: Arc<dyn DocumentStore> = Arc::new(memory_documents());
        let remote = Arc::new(StubRemote::default());
        let fetcher = Arc::new(StubFetcher::default());
        let store: Arc<dyn TarballStore> = Arc::new(memory_tarballs());
        let events = Arc::new(CollectorSink::default());
        let reconciler = Arc::new(Reconciler::new(
            local.clone(),
            remote.clone(),
            Arc::new(KeyedLock::new()),
            events.clone(),
        ));
        let cache = Arc::new(TarballCache::new(
            reconciler,
            store.clone(),
            fetcher.clone(),
            MIN_SIZE,
            events.clone(),
        ));
        Fixture {
            local,
            remote,
            fetcher,
            store,
            events,
            cache,
        }
    }

    fn archive(seed: u8) -> Vec<u8> {
        vec![seed; 256]
    }

    /// Publishes `versions` upstream, each with a matching archive.
    fn publish(fx: &Fixture, name: &str, versions: &[(&str, u8)], latest: &str) {
        let keys: Vec<&str> = versions.iter().map(|(v, _)| *v).collect();
        let mut doc = package(name, &keys, Some(latest), "2024-01-01T00:00:00Z");
        for (version, seed) in versions {
            let bytes = archive(*seed);
            doc.versions.get_mut(*version).unwrap().dist.shasum = Some(sha1_hex(&bytes));
            fx.fetcher.insert(name, version, bytes);
        }
        fx.remote.insert(doc);
    }

    #[tokio::test]
    async fn test_upstream_download_is_cached_and_patched() {
        let fx = fixture();
        publish(&fx, "left-pad", &[("1.0.0", 1), ("1.1.0", 2)], "1.1.0");

        let tarball = fx.cache.fetch_tarball("left-pad", "1.0.0").await.unwrap();
        assert_eq!(tarball.source, TarballSource::Upstream);
        assert_eq!(tarball.bytes, archive(1));
        assert!(fx.store.exists("left-pad-1.0.0").await.unwrap());

        let stored = fx.local.get("left-pad").await.unwrap().unwrap();
        assert!(!stored.first_import);
        assert_eq!(stored.versions.keys().collect::<Vec<_>>(), vec!["1.0.0"]);
        assert_eq!(stored.dist_tags["latest"], "1.0.0");

        fx.cache.fetch_tarball("left-pad", "1.1.0").await.unwrap();
        let stored = fx.local.get("left-pad").await.unwrap().unwrap();
        assert_eq!(
            stored.versions.keys().collect::<Vec<_>>(),
            vec!["1.0.0", "1.1.0"]
        );
        assert_eq!(stored.dist_tags["latest"], "1.1.0");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fetches_keep_every_version() {
        let fx = fixture();
        let versions: Vec<String> = (0..8).map(|minor| format!("1.{minor}.0")).collect();
        let published: Vec<(&str, u8)> = versions
            .iter()
            .enumerate()
            .map(|(seed, version)| (version.as_str(), seed as u8 + 1))
            .collect();
        publish(&fx, "left-pad", &published, "1.7.0");

        let tasks: Vec<_> = versions
            .iter()
            .map(|version| {
                let cache = fx.cache.clone();
                let version = version.clone();
                tokio::spawn(async move { cache.fetch_tarball("left-pad", &version).await })
            })
            .collect();
        for task in tasks {
            let tarball = task.await.unwrap().unwrap();
            assert_eq!(tarball.source, TarballSource::Upstream);
        }

        let stored = fx.local.get("left-pad").await.unwrap().unwrap();
        assert!(!stored.first_import);
        assert_eq!(stored.versions.keys().cloned().collect::<Vec<_>>(), versions);
        assert_eq!(stored.dist_tags["latest"], "1.7.0");
        assert_eq!(fx.store.count().await.unwrap(), 8);
        assert_eq!(fx.local.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_serves_identical_cached_bytes() {
        let fx = fixture();
        publish(&fx, "left-pad", &[("1.0.0", 7)], "1.0.0");

        let first = fx.cache.fetch_tarball("left-pad", "1.0.0").await.unwrap();
        fx.fetcher.set_unreachable(true);
        fx.remote.set_unreachable(true);

        for _ in 0..3 {
            let again = fx.cache.fetch_tarball("left-pad", "1.0.0").await.unwrap();
            assert_eq!(again.source, TarballSource::Cache);
            assert_eq!(again.bytes, first.bytes);
        }
        assert!(fx.events.events().iter().any(|e| {
            matches!(
                e,
                MirrorEvent::TarballServed {
                    origin: TarballOrigin::Cache,
                    ..
                }
            )
        }));
    }

    #[tokio::test]
    async fn test_upstream_checksum_mismatch_is_never_served() {
        let fx = fixture();
        publish(&fx, "left-pad", &[("1.0.0", 1)], "1.0.0");
        fx.fetcher.insert("left-pad", "1.0.0", archive(9));

        let err = fx.cache.fetch_tarball("left-pad", "1.0.0").await.unwrap_err();
        assert!(matches!(err, MirrorError::ChecksumMismatch { .. }));
        assert!(!fx.store.exists("left-pad-1.0.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_cached_checksum_mismatch_is_surfaced() {
        let fx = fixture();
        publish(&fx, "left-pad", &[("1.0.0", 1)], "1.0.0");
        fx.store
            .put("left-pad-1.0.0", &archive(3))
            .await
            .unwrap();
        fx.fetcher.set_unreachable(true);

        let err = fx.cache.fetch_tarball("left-pad", "1.0.0").await.unwrap_err();
        assert!(matches!(err, MirrorError::ChecksumMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert!(fx.store.exists("left-pad-1.0.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_short_cache_entry_is_corrupt() {
        let fx = fixture();
        publish(&fx, "left-pad", &[("1.0.0", 1)], "1.0.0");
        fx.store
            .put("left-pad-1.0.0", b"tiny")
            .await
            .unwrap();
        fx.fetcher.set_unreachable(true);

        let err = fx.cache.fetch_tarball("left-pad", "1.0.0").await.unwrap_err();
        assert!(matches!(err, MirrorError::CorruptCacheEntry { size: 4, .. }));
    }

    #[tokio::test]
    async fn test_cache_miss_returns_upstream_error() {
        let fx = fixture();
        publish(&fx, "left-pad", &[("1.0.0", 1)], "1.0.0");
        fx.fetcher.set_unreachable(true);

        let err = fx.cache.fetch_tarball("left-pad", "1.0.0").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
    }

    #[tokio::test]
    async fn test_unknown_version() {
        let fx = fixture();
        publish(&fx, "left-pad", &[("1.0.0", 1)], "1.0.0");

        let err = fx.cache.fetch_tarball("left-pad", "2.0.0").await.unwrap_err();
        assert!(matches!(err, MirrorError::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_scoped_package() {
        let fx = fixture();
        publish(&fx, "@babel/core", &[("7.0.0", 5)], "7.0.0");

        let tarball = fx.cache.fetch_tarball("@babel/core", "7.0.0").await.unwrap();
        assert_eq!(tarball.source, TarballSource::Upstream);
        assert!(fx.store.exists("@babel/core-7.0.0").await.unwrap());
    }
}

//! The assembled mirror: stores, upstream clients and engine components
//! wired together for one storage directory.

use std::{path::PathBuf, sync::Arc};

use tarn_config::config::Config;
use tarn_events::{EventSinkHandle, ReplicationStage};
use tarn_registry::{
    resolve_version, ChangeFeedClient, PackageDocument, RemoteRegistry, Seq, VersionMetadata,
};
use tarn_utils::{fs::ensure_dir_exists, keyed::KeyedLock, lock::DirLock};
use tracing::{debug, info, warn};

use crate::{
    database::connection::DieselDatabase,
    error::MirrorError,
    reconcile::Reconciler,
    replication::{ReplicationFeedController, ReplicationSettings},
    store::{
        ChangeFeed, DocumentSource, DocumentStore, HttpChangeFeed, HttpDocumentSource,
        HttpTarballFetcher, SqliteDocumentStore, SqliteTarballStore, TarballFetcher, TarballStore,
    },
    tarball::{Tarball, TarballCache},
    MirrorResult,
};

/// Store and upstream implementations a [`Mirror`] is built from.
pub struct Components {
    pub documents: Arc<dyn DocumentStore>,
    pub tarballs: Arc<dyn TarballStore>,
    pub remote: Arc<dyn DocumentSource>,
    pub fetcher: Arc<dyn TarballFetcher>,
    pub feed: Arc<dyn ChangeFeed>,
}

#[derive(Debug, Clone)]
pub struct MirrorSettings {
    /// Base URL written into served `dist.tarball` fields.
    pub public_url: String,
    pub min_tarball_size: u64,
    pub replication: ReplicationSettings,
}

#[derive(Debug, Clone)]
pub struct MirrorStats {
    pub directory: Option<PathBuf>,
    pub documents: u64,
    pub tarballs: u64,
    pub checkpoint: Option<Seq>,
    pub replication: ReplicationStage,
}

pub struct Mirror {
    _lock: Option<DirLock>,
    directory: Option<PathBuf>,
    settings: MirrorSettings,
    documents: Arc<dyn DocumentStore>,
    reconciler: Arc<Reconciler>,
    tarballs: TarballCache,
    replication: Arc<ReplicationFeedController>,
}

impl Mirror {
    /// Opens the mirror described by `config`.
    ///
    /// Takes exclusive ownership of the storage directory for the lifetime
    /// of the returned value.
    pub fn open(config: &Config, events: EventSinkHandle) -> MirrorResult<Self> {
        let directory = config.get_directory()?;
        ensure_dir_exists(&directory)?;
        let lock = DirLock::try_acquire(&directory)?;
        debug!(directory = %directory.display(), "acquired storage directory");

        let documents = DieselDatabase::open_documents(config.get_documents_db_path()?)?;
        let tarballs = DieselDatabase::open_tarballs(config.get_tarballs_db_path()?)?;

        let metadata_timeout = config.metadata_timeout()?;
        let registry = Arc::new(RemoteRegistry::new(
            config.remote_url(),
            metadata_timeout,
            config.max_document_size,
        )?);
        let feed_client = Arc::new(ChangeFeedClient::new(
            config.remote_skim_url(),
            metadata_timeout,
            config
                .max_document_size
                .saturating_mul(u64::from(config.replication.batch_size)),
        )?);

        let components = Components {
            documents: Arc::new(SqliteDocumentStore::new(documents)),
            tarballs: Arc::new(SqliteTarballStore::new(tarballs)),
            remote: Arc::new(HttpDocumentSource::new(registry.clone(), metadata_timeout)),
            fetcher: Arc::new(HttpTarballFetcher::new(
                registry,
                config.tarball_timeout()?,
                config.max_tarball_size,
            )),
            feed: Arc::new(HttpChangeFeed::new(
                feed_client,
                metadata_timeout,
                config.replication.longpoll_timeout()?,
            )),
        };
        let settings = MirrorSettings {
            public_url: config.public_url().to_string(),
            min_tarball_size: config.min_tarball_size,
            replication: ReplicationSettings::from_config(&config.replication)?,
        };

        let mut mirror = Self::assemble(components, settings, events);
        mirror._lock = Some(lock);
        mirror.directory = Some(directory);
        Ok(mirror)
    }

    /// Wires `components` together without touching the filesystem.
    pub fn assemble(
        components: Components,
        settings: MirrorSettings,
        events: EventSinkHandle,
    ) -> Self {
        let locks = Arc::new(KeyedLock::new());
        let reconciler = Arc::new(Reconciler::new(
            components.documents.clone(),
            components.remote,
            locks.clone(),
            events.clone(),
        ));
        let tarballs = TarballCache::new(
            reconciler.clone(),
            components.tarballs,
            components.fetcher,
            settings.min_tarball_size,
            events.clone(),
        );
        let replication = Arc::new(ReplicationFeedController::new(
            components.feed,
            components.documents.clone(),
            locks,
            events,
            settings.replication.clone(),
        ));

        Self {
            _lock: None,
            directory: None,
            settings,
            documents: components.documents,
            reconciler,
            tarballs,
            replication,
        }
    }

    pub fn directory(&self) -> Option<&PathBuf> {
        self.directory.as_ref()
    }

    /// Package document as served to clients, with tarball URLs pointing here.
    pub async fn package(&self, name: &str) -> MirrorResult<PackageDocument> {
        let doc = self.reconciler.reconcile(name).await?;
        Ok(doc.for_serving(&self.settings.public_url))
    }

    /// Metadata of the release matching `query`: a version, a dist-tag,
    /// `latest`, or a range.
    pub async fn package_version(&self, name: &str, query: &str) -> MirrorResult<VersionMetadata> {
        let doc = self.package(name).await?;
        resolve_version(&doc, query).cloned().ok_or_else(|| {
            MirrorError::VersionNotFound {
                name: name.to_string(),
                version: query.to_string(),
            }
        })
    }

    pub async fn tarball(&self, name: &str, version: &str) -> MirrorResult<Tarball> {
        self.tarballs.fetch_tarball(name, version).await
    }

    pub fn replication(&self) -> &Arc<ReplicationFeedController> {
        &self.replication
    }

    /// Starts the change-feed consumer. Returns `false` if it already runs.
    pub fn start_replication(&self) -> bool {
        self.replication.start()
    }

    pub async fn stats(&self) -> MirrorResult<MirrorStats> {
        Ok(MirrorStats {
            directory: self.directory.clone(),
            documents: self.documents.count().await?,
            tarballs: self.tarballs.store().count().await?,
            checkpoint: self.documents.checkpoint(self.replication.source()).await?,
            replication: self.replication.state(),
        })
    }

    /// Stops replication, then closes both stores. Safe to call repeatedly.
    ///
    /// Both stores are always closed; the first close error is returned.
    pub async fn shutdown(&self) -> MirrorResult<()> {
        self.replication.stop().await;
        let documents = self.documents.close().await;
        let tarballs = self.tarballs.store().close().await;

        if let Err(err) = &documents {
            warn!("failed to close document store: {err}");
        }
        if let Err(err) = &tarballs {
            warn!("failed to close tarball store: {err}");
        }
        documents?;
        tarballs?;
        info!("mirror shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tarn_events::NullSink;
    use tarn_utils::hash::sha1_hex;

    use super::*;
    use crate::{
        error::ErrorKind,
        replication::BackoffPolicy,
        tarball::TarballSource,
        store::Revision,
        test_support::{memory_documents, memory_tarballs, package, StubFeed, StubFetcher, StubRemote},
    };

    fn settings() -> MirrorSettings {
        MirrorSettings {
            public_url: "http://mirror.test".to_string(),
            min_tarball_size: 100,
            replication: ReplicationSettings {
                batch_size: 10,
                backoff: BackoffPolicy::new(
                    Duration::from_millis(10),
                    1.1,
                    Duration::from_millis(100),
                ),
            },
        }
    }

    /// Document store whose handle can no longer be closed.
    struct UnclosableDocuments(SqliteDocumentStore);

    #[async_trait]
    impl DocumentStore for UnclosableDocuments {
        async fn get(&self, name: &str) -> MirrorResult<Option<PackageDocument>> {
            self.0.get(name).await
        }

        async fn put(&self, name: &str, doc: &PackageDocument) -> MirrorResult<Revision> {
            self.0.put(name, doc).await
        }

        async fn replace(
            &self,
            name: &str,
            expected: &str,
            doc: &PackageDocument,
        ) -> MirrorResult<Revision> {
            self.0.replace(name, expected, doc).await
        }

        async fn remove(&self, name: &str) -> MirrorResult<bool> {
            self.0.remove(name).await
        }

        async fn count(&self) -> MirrorResult<u64> {
            self.0.count().await
        }

        async fn checkpoint(&self, source: &str) -> MirrorResult<Option<Seq>> {
            self.0.checkpoint(source).await
        }

        async fn set_checkpoint(&self, source: &str, seq: &Seq) -> MirrorResult<()> {
            self.0.set_checkpoint(source, seq).await
        }

        async fn close(&self) -> MirrorResult<()> {
            Err(MirrorError::Custom("document store mutex poisoned".to_string()))
        }
    }

    struct Fixture {
        remote: Arc<StubRemote>,
        fetcher: Arc<StubFetcher>,
        mirror: Mirror,
    }

    fn fixture() -> Fixture {
        let remote = Arc::new(StubRemote::default());
        let fetcher = Arc::new(StubFetcher::default());
        let mirror = Mirror::assemble(
            Components {
                documents: Arc::new(memory_documents()),
                tarballs: Arc::new(memory_tarballs()),
                remote: remote.clone(),
                fetcher: fetcher.clone(),
                feed: Arc::new(StubFeed::new(0)),
            },
            settings(),
            Arc::new(NullSink),
        );
        Fixture {
            remote,
            fetcher,
            mirror,
        }
    }

    #[tokio::test]
    async fn test_package_rewrites_dist_urls() {
        let fx = fixture();
        fx.remote.insert(package(
            "@scope/pkg",
            &["1.0.0", "1.1.0"],
            Some("1.1.0"),
            "2024-01-01T00:00:00Z",
        ));

        let doc = fx.mirror.package("@scope/pkg").await.unwrap();
        assert_eq!(
            doc.versions["1.0.0"].dist.tarball,
            "http://mirror.test/tarballs/@scope/pkg/1.0.0.tgz"
        );
        assert_eq!(
            doc.versions["1.1.0"].dist.info.as_deref(),
            Some("http://mirror.test/@scope/pkg/1.1.0")
        );
    }

    #[tokio::test]
    async fn test_package_version_queries() {
        let fx = fixture();
        let mut doc = package(
            "left-pad",
            &["1.0.0", "1.2.0", "2.0.0-beta.1"],
            Some("1.2.0"),
            "2024-01-01T00:00:00Z",
        );
        doc.dist_tags
            .insert("next".to_string(), "2.0.0-beta.1".to_string());
        fx.remote.insert(doc);

        let exact = fx.mirror.package_version("left-pad", "1.0.0").await.unwrap();
        assert_eq!(exact.version.as_deref(), Some("1.0.0"));

        let range = fx.mirror.package_version("left-pad", "^1.0.0").await.unwrap();
        assert_eq!(range.version.as_deref(), Some("1.2.0"));

        let tagged = fx.mirror.package_version("left-pad", "next").await.unwrap();
        assert_eq!(tagged.version.as_deref(), Some("2.0.0-beta.1"));

        let err = fx
            .mirror
            .package_version("left-pad", "^3.0.0")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_stats_and_shutdown() {
        let fx = fixture();
        let mut doc = package("left-pad", &["1.0.0"], Some("1.0.0"), "2024-01-01T00:00:00Z");
        let bytes = vec![1u8; 128];
        doc.versions.get_mut("1.0.0").unwrap().dist.shasum = Some(sha1_hex(&bytes));
        fx.remote.insert(doc);
        fx.fetcher.insert("left-pad", "1.0.0", bytes);

        let tarball = fx.mirror.tarball("left-pad", "1.0.0").await.unwrap();
        assert_eq!(tarball.source, TarballSource::Upstream);

        let stats = fx.mirror.stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.tarballs, 1);
        assert!(stats.checkpoint.is_none());
        assert_eq!(stats.replication, ReplicationStage::Idle);

        fx.mirror.shutdown().await.unwrap();
        fx.mirror.shutdown().await.unwrap();
        assert_eq!(fx.mirror.replication().state(), ReplicationStage::Stopped);
        assert!(fx.mirror.stats().await.is_err());
        assert_eq!(fx.remote.calls(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_running_replication() {
        let fx = fixture();
        assert!(fx.mirror.start_replication());
        assert!(fx.mirror.replication().is_running());

        fx.mirror.shutdown().await.unwrap();
        assert!(!fx.mirror.replication().is_running());
        assert_eq!(fx.mirror.replication().state(), ReplicationStage::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_closes_tarballs_when_documents_fail() {
        let tarballs = Arc::new(memory_tarballs());
        let mirror = Mirror::assemble(
            Components {
                documents: Arc::new(UnclosableDocuments(memory_documents())),
                tarballs: tarballs.clone(),
                remote: Arc::new(StubRemote::default()),
                fetcher: Arc::new(StubFetcher::default()),
                feed: Arc::new(StubFeed::new(0)),
            },
            settings(),
            Arc::new(NullSink),
        );

        let err = mirror.shutdown().await.unwrap_err();
        assert!(matches!(err, MirrorError::Custom(_)));
        assert!(tarballs.count().await.is_err());
    }

    #[tokio::test]
    async fn test_open_locks_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            directory: Some(dir.path().display().to_string()),
            base_url: Some("http://mirror.test/".to_string()),
            ..Config::default()
        };

        let mirror = Mirror::open(&config, Arc::new(NullSink)).unwrap();
        assert!(dir.path().join("documents.db").exists());
        assert!(dir.path().join("tarballs.db").exists());

        let second = Mirror::open(&config, Arc::new(NullSink));
        assert!(matches!(second, Err(MirrorError::Lock(_))));

        let stats = mirror.stats().await.unwrap();
        assert_eq!(stats.documents, 0);
        assert_eq!(stats.directory.as_deref(), Some(dir.path()));
        mirror.shutdown().await.unwrap();
    }
}

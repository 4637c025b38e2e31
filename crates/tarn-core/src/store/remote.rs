//! Upstream-backed implementations of the store seams.
//!
//! The registry clients are blocking. Each call runs on the blocking pool
//! and is additionally bounded by a tokio timeout, so a stuck socket can
//! never hold up the engine longer than the configured limit.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tarn_registry::{
    ChangeFeedClient, ChangesResponse, DbInfo, PackageDocument, RemoteRegistry, Seq,
};
use tokio::time::timeout;

use super::{run_blocking, ChangeFeed, DocumentSource, TarballFetcher};
use crate::{error::MirrorError, MirrorResult};

/// Slack on top of the HTTP timeout before the task is abandoned.
const TIMEOUT_GRACE: Duration = Duration::from_secs(1);

async fn bounded<F, T>(target: &str, limit: Duration, fut: F) -> MirrorResult<T>
where
    F: Future<Output = MirrorResult<T>>,
{
    match timeout(limit + TIMEOUT_GRACE, fut).await {
        Ok(result) => result,
        Err(_) => Err(MirrorError::Timeout(target.to_string())),
    }
}

/// Package documents from the upstream registry.
pub struct HttpDocumentSource {
    registry: Arc<RemoteRegistry>,
    timeout: Duration,
}

impl HttpDocumentSource {
    pub fn new(registry: Arc<RemoteRegistry>, timeout: Duration) -> Self {
        Self {
            registry,
            timeout,
        }
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch(&self, name: &str) -> MirrorResult<PackageDocument> {
        let registry = self.registry.clone();
        let key = name.to_string();
        let task = run_blocking(move || {
            registry
                .fetch_document(&key)
                .map_err(|err| MirrorError::from_upstream(&key, err))
        });
        bounded(name, self.timeout, task).await
    }
}

/// Release archives from the upstream registry.
pub struct HttpTarballFetcher {
    registry: Arc<RemoteRegistry>,
    timeout: Duration,
    max_size: u64,
}

impl HttpTarballFetcher {
    pub fn new(registry: Arc<RemoteRegistry>, timeout: Duration, max_size: u64) -> Self {
        Self {
            registry,
            timeout,
            max_size,
        }
    }
}

#[async_trait]
impl TarballFetcher for HttpTarballFetcher {
    async fn fetch(&self, name: &str, version: &str) -> MirrorResult<Vec<u8>> {
        let registry = self.registry.clone();
        let (timeout, max_size) = (self.timeout, self.max_size);
        let target = format!("{name}@{version}");
        let (name, version) = (name.to_string(), version.to_string());

        let task = {
            let target = target.clone();
            run_blocking(move || {
                registry
                    .fetch_tarball(&name, &version, timeout, max_size)
                    .map_err(|err| MirrorError::from_upstream(&target, err))
            })
        };
        bounded(&target, timeout, task).await
    }
}

/// The upstream `_changes` feed, polled in longpoll mode.
pub struct HttpChangeFeed {
    client: Arc<ChangeFeedClient>,
    request_timeout: Duration,
    longpoll: Duration,
}

impl HttpChangeFeed {
    pub fn new(client: Arc<ChangeFeedClient>, request_timeout: Duration, longpoll: Duration) -> Self {
        Self {
            client,
            request_timeout,
            longpoll,
        }
    }
}

#[async_trait]
impl ChangeFeed for HttpChangeFeed {
    fn source(&self) -> &str {
        self.client.source()
    }

    async fn info(&self) -> MirrorResult<DbInfo> {
        let client = self.client.clone();
        let task = run_blocking(move || {
            client
                .info()
                .map_err(|err| MirrorError::from_upstream(client.source(), err))
        });
        bounded(self.client.source(), self.request_timeout, task).await
    }

    async fn changes(&self, since: &Seq, limit: u32) -> MirrorResult<ChangesResponse> {
        let client = self.client.clone();
        let since = since.clone();
        let longpoll = self.longpoll;
        let task = run_blocking(move || {
            client
                .changes(&since, limit, longpoll)
                .map_err(|err| MirrorError::from_upstream(client.source(), err))
        });
        bounded(
            self.client.source(),
            self.request_timeout + self.longpoll,
            task,
        )
        .await
    }
}

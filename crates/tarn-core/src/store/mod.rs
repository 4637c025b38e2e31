//! Storage seams of the engine.
//!
//! The engine only talks to these traits. [`local`] backs them with the two
//! SQLite databases, [`remote`] with the upstream HTTP clients, and tests
//! swap in stubs.

use async_trait::async_trait;
use tarn_registry::{ChangesResponse, DbInfo, PackageDocument, Seq};

use crate::{error::MirrorError, MirrorResult};

pub mod local;
pub mod remote;

pub use local::{SqliteDocumentStore, SqliteTarballStore};
pub use remote::{HttpChangeFeed, HttpDocumentSource, HttpTarballFetcher};

/// Opaque document revision token.
pub type Revision = String;

/// Read-only access to upstream package documents.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetches the document of `name`.
    ///
    /// Fails with [`MirrorError::NotFound`], [`MirrorError::Unreachable`] or
    /// [`MirrorError::Timeout`] for the corresponding upstream conditions.
    async fn fetch(&self, name: &str) -> MirrorResult<PackageDocument>;
}

/// Local, writable package document store.
///
/// Documents returned by [`get`](Self::get) carry their revision in
/// `PackageDocument::revision`. The revision field of documents passed in
/// is ignored; the store assigns a fresh one on every write.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, name: &str) -> MirrorResult<Option<PackageDocument>>;

    /// Creates the document stored under `name`. Fails with
    /// [`MirrorError::Conflict`] if `name` already exists.
    async fn put(&self, name: &str, doc: &PackageDocument) -> MirrorResult<Revision>;

    /// Replaces `name` only if its stored revision is still `expected`.
    ///
    /// Fails with [`MirrorError::Conflict`] if the revision moved on or the
    /// document is gone.
    async fn replace(
        &self,
        name: &str,
        expected: &str,
        doc: &PackageDocument,
    ) -> MirrorResult<Revision>;

    /// Removes `name`. Returns whether a document was removed.
    async fn remove(&self, name: &str) -> MirrorResult<bool>;

    async fn count(&self) -> MirrorResult<u64>;

    /// Last replicated sequence for the feed at `source`.
    async fn checkpoint(&self, source: &str) -> MirrorResult<Option<Seq>>;

    async fn set_checkpoint(&self, source: &str, seq: &Seq) -> MirrorResult<()>;

    async fn close(&self) -> MirrorResult<()>;
}

/// Immutable tarball bytes keyed by tarball id.
#[async_trait]
pub trait TarballStore: Send + Sync {
    async fn get(&self, id: &str) -> MirrorResult<Option<Vec<u8>>>;

    /// Stores `bytes` under `id` unless a record already exists.
    ///
    /// Returns `true` if the bytes were written.
    async fn put(&self, id: &str, bytes: &[u8]) -> MirrorResult<bool>;

    async fn exists(&self, id: &str) -> MirrorResult<bool>;

    async fn count(&self) -> MirrorResult<u64>;

    async fn close(&self) -> MirrorResult<()>;
}

/// Upstream tarball downloads.
#[async_trait]
pub trait TarballFetcher: Send + Sync {
    async fn fetch(&self, name: &str, version: &str) -> MirrorResult<Vec<u8>>;
}

/// A CouchDB-style change feed.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Identifies the feed; checkpoints are stored under this key.
    fn source(&self) -> &str;

    async fn info(&self) -> MirrorResult<DbInfo>;

    /// Waits for up to `limit` changes after `since`.
    async fn changes(&self, since: &Seq, limit: u32) -> MirrorResult<ChangesResponse>;
}

/// Runs blocking store or network work on the blocking pool.
pub(crate) async fn run_blocking<F, T>(f: F) -> MirrorResult<T>
where
    F: FnOnce() -> MirrorResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| MirrorError::Custom(format!("blocking task failed: {err}")))?
}

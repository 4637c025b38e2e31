//! Package documents and upstream access for the tarn registry mirror.
//!
//! This crate knows what an npm-style registry speaks:
//!
//! - [`PackageDocument`]: the per-package metadata document, with the merge
//!   and trim helpers the mirror applies to it
//! - [`version`]: version queries and the `latest` precedence rule
//! - [`RemoteRegistry`]: blocking client for documents and tarballs
//! - [`ChangeFeedClient`]: blocking client for the replication change feed
//!
//! All network calls are blocking. Async callers run them on a blocking pool.

pub mod document;
pub mod error;
pub mod feed;
pub mod remote;
pub mod version;

pub use document::{tarball_id, Dist, PackageDocument, VersionMetadata};
pub use error::{RegistryError, Result};
pub use feed::{Change, ChangeFeedClient, ChangesResponse, DbInfo, Seq};
pub use remote::RemoteRegistry;
pub use version::{compute_latest_tag, resolve_version};

//! Caching and reconciliation engine of the tarn registry mirror.
//!
//! - [`reconcile::Reconciler`] merges cached package documents with upstream
//! - [`tarball::TarballCache`] serves verified archives, upstream first
//! - [`replication::ReplicationFeedController`] keeps the document cache
//!   populated from the upstream change feed
//! - [`mirror::Mirror`] wires them to the SQLite stores of a storage directory

use error::MirrorError;

pub mod database;
pub mod error;
pub mod mirror;
pub mod reconcile;
pub mod replication;
pub mod store;
pub mod tarball;

#[cfg(test)]
mod test_support;

pub type MirrorResult<T> = std::result::Result<T, MirrorError>;

//! Repository pattern implementations for database operations.
//!
//! - [`DocumentRepository`](documents::DocumentRepository) - package documents
//! - [`CheckpointRepository`](documents::CheckpointRepository) - replication checkpoints
//! - [`TarballRepository`](tarballs::TarballRepository) - tarball bytes

pub mod documents;
pub mod tarballs;

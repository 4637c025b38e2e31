//! Error types for tarn-core.

use miette::Diagnostic;
use tarn_config::error::ConfigError;
use tarn_db::error::DbError;
use tarn_dl::error::FetchErrorKind;
use tarn_registry::RegistryError;
use tarn_utils::error::{FileSystemError, LockError};
use thiserror::Error;

/// Coarse error class, for collaborators that map failures to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unreachable,
    Corrupt,
    Internal,
}

/// Core error type for mirror operations.
#[derive(Error, Diagnostic, Debug)]
pub enum MirrorError {
    #[error("Upstream unreachable while fetching {target}: {reason}")]
    #[diagnostic(
        code(tarn::unreachable),
        help("Check your network connection and the configured remote")
    )]
    Unreachable { target: String, reason: String },

    #[error("Upstream timed out while fetching {0}")]
    #[diagnostic(
        code(tarn::timeout),
        help("Raise `metadata_timeout` or `tarball_timeout` if the upstream is slow")
    )]
    Timeout(String),

    #[error("Package '{0}' not found")]
    #[diagnostic(code(tarn::not_found), help("Check the package name"))]
    NotFound(String),

    #[error("Version '{version}' of '{name}' not found")]
    #[diagnostic(
        code(tarn::version_not_found),
        help("Use `tarn info <name>` to list known versions")
    )]
    VersionNotFound { name: String, version: String },

    #[error("Checksum mismatch for '{id}': expected {expected}, got {actual}")]
    #[diagnostic(
        code(tarn::checksum),
        help("The cached tarball does not match the published shasum")
    )]
    ChecksumMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Cached tarball '{id}' is corrupt ({size} bytes)")]
    #[diagnostic(
        code(tarn::corrupt_cache),
        help("The entry is smaller than `min_tarball_size`")
    )]
    CorruptCacheEntry { id: String, size: u64 },

    #[error("Replication failed: {0}")]
    #[diagnostic(code(tarn::replication))]
    ReplicationError(String),

    #[error("Failed to patch document '{name}': {reason}")]
    #[diagnostic(code(tarn::patch))]
    PatchFailure { name: String, reason: String },

    #[error("Revision conflict on '{0}'")]
    #[diagnostic(code(tarn::conflict))]
    Conflict(String),

    #[error("Invalid document '{name}'")]
    #[diagnostic(
        code(tarn::invalid_document),
        help("The stored document may be corrupted")
    )]
    InvalidDocument {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] DbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(
        code(tarn::lock),
        help("Another tarn process is using this storage directory")
    )]
    Lock(#[from] LockError),

    #[error(transparent)]
    #[diagnostic(code(tarn::fs), help("Check directory permissions"))]
    FileSystem(#[from] FileSystemError),

    #[error("Error while {action}")]
    #[diagnostic(code(tarn::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    #[diagnostic(code(tarn::error))]
    Custom(String),
}

impl MirrorError {
    /// Classifies an upstream failure for `target` (a package name or tarball id).
    pub fn from_upstream(target: &str, err: RegistryError) -> Self {
        match err.fetch_kind() {
            Some(FetchErrorKind::NotFound) => MirrorError::NotFound(target.to_string()),
            Some(FetchErrorKind::Timeout) => MirrorError::Timeout(target.to_string()),
            Some(FetchErrorKind::Unreachable) => {
                MirrorError::Unreachable {
                    target: target.to_string(),
                    reason: err.to_string(),
                }
            }
            _ => MirrorError::Registry(err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MirrorError::NotFound(_) | MirrorError::VersionNotFound { .. } => ErrorKind::NotFound,
            MirrorError::Unreachable { .. } | MirrorError::Timeout(_) => ErrorKind::Unreachable,
            MirrorError::ChecksumMismatch { .. } | MirrorError::CorruptCacheEntry { .. } => {
                ErrorKind::Corrupt
            }
            MirrorError::Registry(err) => {
                match err.fetch_kind() {
                    Some(FetchErrorKind::NotFound) => ErrorKind::NotFound,
                    Some(FetchErrorKind::Unreachable | FetchErrorKind::Timeout) => {
                        ErrorKind::Unreachable
                    }
                    _ => ErrorKind::Internal,
                }
            }
            _ => ErrorKind::Internal,
        }
    }
}

/// Trait for adding context to IO errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, MirrorError>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, MirrorError>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            MirrorError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}

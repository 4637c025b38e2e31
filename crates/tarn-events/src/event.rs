use std::time::Duration;

/// Where a served tarball came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarballOrigin {
    Upstream,
    Cache,
}

/// Lifecycle of the replication feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationStage {
    Idle,
    Syncing,
    Retrying,
    Stopped,
}

impl std::fmt::Display for ReplicationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReplicationStage::Idle => "idle",
            ReplicationStage::Syncing => "syncing",
            ReplicationStage::Retrying => "retrying",
            ReplicationStage::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// All event types emitted by the mirror engine.
#[derive(Debug, Clone)]
pub enum MirrorEvent {
    /// A package document was served from the local cache because the
    /// upstream copy was missing, older, or unreachable.
    DocumentCached {
        name: String,
    },
    /// A package was seen for the first time and stored trimmed to one version.
    DocumentImported {
        name: String,
        version: Option<String>,
    },
    /// The local document was refreshed with upstream top-level fields.
    DocumentMerged {
        name: String,
        version_count: usize,
    },
    /// A document was removed because upstream deleted it.
    DocumentDeleted {
        name: String,
    },
    /// A tarball is being served.
    TarballServed {
        name: String,
        version: String,
        origin: TarballOrigin,
        size: u64,
    },
    /// Upstream download failed; falling back to the cache.
    TarballCacheFallback {
        name: String,
        version: String,
        reason: String,
    },
    /// Updating the document after a tarball download failed.
    PatchFailed {
        name: String,
        version: String,
        error: String,
    },
    /// Replication changed state.
    Replication {
        stage: ReplicationStage,
    },
    /// A replication batch was applied.
    SyncProgress {
        seq: String,
        percent: f64,
        applied: usize,
    },
    /// A replication request failed and will be retried.
    ReplicationRetry {
        delay: Duration,
        error: String,
    },
}

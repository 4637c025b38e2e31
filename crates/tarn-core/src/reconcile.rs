//! Metadata reconciliation between the local cache and upstream.

use std::sync::Arc;

use tarn_events::{EventSinkHandle, MirrorEvent};
use tarn_registry::PackageDocument;
use tarn_utils::keyed::KeyedLock;
use tracing::{debug, info, warn};

use crate::{
    error::MirrorError,
    store::{DocumentSource, DocumentStore, Revision},
    MirrorResult,
};

/// Writes `update(current)` for `name` with a conditional write.
///
/// `current` is the caller's last read of the document; `None` creates it.
/// The written document always carries `name`, whatever `update` returns.
/// If the revision moved on, the document is read again and `update` applied
/// once more. A second conflict is returned to the caller.
pub(crate) async fn write_with_retry<F>(
    store: &dyn DocumentStore,
    name: &str,
    mut current: Option<PackageDocument>,
    update: F,
) -> MirrorResult<Revision>
where
    F: Fn(Option<&PackageDocument>) -> PackageDocument,
{
    let mut retried = false;
    loop {
        let mut next = update(current.as_ref());
        next.name = name.to_string();
        let result = match current.as_ref().and_then(|doc| doc.revision.as_deref()) {
            Some(rev) => store.replace(name, rev, &next).await,
            None => store.put(name, &next).await,
        };

        match result {
            Err(MirrorError::Conflict(_)) if !retried => {
                debug!(name, "revision conflict, re-reading document");
                retried = true;
                current = store.get(name).await?;
            }
            other => return other,
        }
    }
}

/// Produces the authoritative document for a package name.
pub struct Reconciler {
    local: Arc<dyn DocumentStore>,
    remote: Arc<dyn DocumentSource>,
    locks: Arc<KeyedLock>,
    events: EventSinkHandle,
}

impl Reconciler {
    pub fn new(
        local: Arc<dyn DocumentStore>,
        remote: Arc<dyn DocumentSource>,
        locks: Arc<KeyedLock>,
        events: EventSinkHandle,
    ) -> Self {
        Self {
            local,
            remote,
            locks,
            events,
        }
    }

    pub fn local(&self) -> &Arc<dyn DocumentStore> {
        &self.local
    }

    pub fn locks(&self) -> &Arc<KeyedLock> {
        &self.locks
    }

    /// Returns the freshest known document for `name`.
    ///
    /// With a cached copy, upstream failures degrade to that copy. Without
    /// one, the upstream error is returned. Non-version keys are purged from
    /// whatever is returned.
    pub async fn reconcile(&self, name: &str) -> MirrorResult<PackageDocument> {
        let _guard = self.locks.lock(name).await;

        match self.local.get(name).await? {
            Some(local) => self.refresh(name, local).await,
            None => self.import(name).await,
        }
    }

    async fn refresh(&self, name: &str, local: PackageDocument) -> MirrorResult<PackageDocument> {
        let mut remote = match self.remote.fetch(name).await {
            Ok(remote) => named(remote, name),
            Err(err) => {
                warn!(name, "serving cached document, upstream failed: {err}");
                return Ok(self.serve_local(name, local));
            }
        };

        if !remote.is_fresher_or_equal(&local) {
            debug!(name, "cached document is newer than upstream");
            return Ok(self.serve_local(name, local));
        }

        let version_count = local.versions.len();
        let write = write_with_retry(self.local.as_ref(), name, Some(local), |current| {
            match current {
                Some(current) => remote.merged_onto(current),
                None => remote.trimmed_for_import(),
            }
        })
        .await;

        match write {
            Ok(_) => {
                debug!(name, version_count, "merged upstream document");
                self.events.emit(MirrorEvent::DocumentMerged {
                    name: name.to_string(),
                    version_count,
                });
            }
            Err(err) => warn!(name, "failed to store merged document: {err}"),
        }

        remote.purge_invalid_versions();
        Ok(remote)
    }

    async fn import(&self, name: &str) -> MirrorResult<PackageDocument> {
        let mut remote = match self.remote.fetch(name).await {
            Ok(remote) => named(remote, name),
            Err(err) => {
                warn!(name, kind = ?err.kind(), "upstream lookup failed: {err}");
                return Err(err);
            }
        };

        let trimmed = remote.trimmed_for_import();
        let version = trimmed.versions.keys().next().cloned();

        let write = write_with_retry(self.local.as_ref(), name, None, |current| {
            match current {
                Some(current) => remote.merged_onto(current),
                None => trimmed.clone(),
            }
        })
        .await;

        match write {
            Ok(_) => {
                info!(name, version = version.as_deref(), "imported package");
                self.events.emit(MirrorEvent::DocumentImported {
                    name: name.to_string(),
                    version,
                });
            }
            Err(err) => warn!(name, "failed to store imported document: {err}"),
        }

        remote.purge_invalid_versions();
        Ok(remote)
    }

    fn serve_local(&self, name: &str, mut local: PackageDocument) -> PackageDocument {
        local.purge_invalid_versions();
        self.events.emit(MirrorEvent::DocumentCached {
            name: name.to_string(),
        });
        local
    }
}

/// Upstream documents are keyed by the requested name, even when their
/// `name` field is missing or differs.
fn named(mut doc: PackageDocument, name: &str) -> PackageDocument {
    if doc.name != name {
        debug!(name, upstream = %doc.name, "upstream document name differs");
        doc.name = name.to_string();
    }
    doc
}

//! SQLite-backed stores.

use async_trait::async_trait;
use chrono::Utc;
use tarn_db::{
    error::DbError,
    models::{
        documents::{NewCheckpoint, NewDocument},
        tarballs::NewTarball,
    },
    repository::{
        documents::{CheckpointRepository, DocumentRepository},
        tarballs::TarballRepository,
    },
};
use tarn_registry::{PackageDocument, Seq};
use tarn_utils::hash::content_digest;
use tracing::{debug, trace, warn};

use super::{run_blocking, DocumentStore, Revision, TarballStore};
use crate::{database::connection::DieselDatabase, error::MirrorError, MirrorResult};

/// Builds the revision following `previous` for a document serialized as `body`.
///
/// Revisions look like `"<generation>-<digest>"`; the generation starts at 1.
fn next_revision(previous: Option<&str>, body: &str) -> Revision {
    let generation = previous
        .and_then(|rev| rev.split_once('-'))
        .and_then(|(generation, _)| generation.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, content_digest(body.as_bytes()))
}

fn serialize(doc: &PackageDocument) -> MirrorResult<String> {
    let mut doc = doc.clone();
    doc.revision = None;
    doc.to_json().map_err(|source| {
        MirrorError::InvalidDocument {
            name: doc.name.clone(),
            source,
        }
    })
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Package documents and replication checkpoints in `documents.db`.
pub struct SqliteDocumentStore {
    db: DieselDatabase,
}

impl SqliteDocumentStore {
    pub fn new(db: DieselDatabase) -> Self {
        Self {
            db,
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, name: &str) -> MirrorResult<Option<PackageDocument>> {
        let db = self.db.clone();
        let key = name.to_string();
        let row = run_blocking(move || db.with_conn(|conn| DocumentRepository::find(conn, &key)))
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut doc = PackageDocument::from_json(row.body.as_bytes()).map_err(|source| {
            MirrorError::InvalidDocument {
                name: name.to_string(),
                source,
            }
        })?;
        doc.revision = Some(row.rev);
        Ok(Some(doc))
    }

    async fn put(&self, name: &str, doc: &PackageDocument) -> MirrorResult<Revision> {
        let body = serialize(doc)?;
        let rev = next_revision(None, &body);
        let name = name.to_string();
        let db = self.db.clone();

        let result = {
            let rev = rev.clone();
            let name = name.clone();
            run_blocking(move || {
                let updated_at = now();
                db.with_conn(|conn| {
                    DocumentRepository::insert(
                        conn,
                        &NewDocument {
                            name: &name,
                            rev: &rev,
                            body: &body,
                            updated_at: &updated_at,
                        },
                    )
                })
            })
            .await
        };

        match result {
            Ok(_) => {
                trace!(%name, %rev, "document created");
                Ok(rev)
            }
            Err(MirrorError::Store(DbError::UniqueViolation(_))) => Err(MirrorError::Conflict(name)),
            Err(err) => Err(err),
        }
    }

    async fn replace(
        &self,
        name: &str,
        expected: &str,
        doc: &PackageDocument,
    ) -> MirrorResult<Revision> {
        let body = serialize(doc)?;
        let rev = next_revision(Some(expected), &body);
        let db = self.db.clone();

        let updated = {
            let rev = rev.clone();
            let name = name.to_string();
            let expected = expected.to_string();
            run_blocking(move || {
                let updated_at = now();
                db.transaction(|conn| {
                    DocumentRepository::replace(
                        conn,
                        &expected,
                        &NewDocument {
                            name: &name,
                            rev: &rev,
                            body: &body,
                            updated_at: &updated_at,
                        },
                    )
                })
            })
            .await?
        };

        if updated == 0 {
            debug!(name, expected, "stale revision");
            return Err(MirrorError::Conflict(name.to_string()));
        }
        trace!(name, %rev, "document replaced");
        Ok(rev)
    }

    async fn remove(&self, name: &str) -> MirrorResult<bool> {
        let db = self.db.clone();
        let name = name.to_string();
        let removed =
            run_blocking(move || db.with_conn(|conn| DocumentRepository::delete(conn, &name)))
                .await?;
        Ok(removed > 0)
    }

    async fn count(&self) -> MirrorResult<u64> {
        let db = self.db.clone();
        let count = run_blocking(move || db.with_conn(DocumentRepository::count)).await?;
        Ok(count.max(0) as u64)
    }

    async fn checkpoint(&self, source: &str) -> MirrorResult<Option<Seq>> {
        let db = self.db.clone();
        let key = source.to_string();
        let row = run_blocking(move || db.with_conn(|conn| CheckpointRepository::get(conn, &key)))
            .await?;

        Ok(row.and_then(|row| {
            let seq = Seq::from_json(&row.seq);
            if seq.is_none() {
                warn!(source, raw = %row.seq, "ignoring unreadable checkpoint");
            }
            seq
        }))
    }

    async fn set_checkpoint(&self, source: &str, seq: &Seq) -> MirrorResult<()> {
        let db = self.db.clone();
        let source = source.to_string();
        let seq = seq.to_json();
        run_blocking(move || {
            let updated_at = now();
            db.with_conn(|conn| {
                CheckpointRepository::upsert(
                    conn,
                    &NewCheckpoint {
                        source: &source,
                        seq: &seq,
                        updated_at: &updated_at,
                    },
                )
            })
        })
        .await?;
        Ok(())
    }

    async fn close(&self) -> MirrorResult<()> {
        let db = self.db.clone();
        run_blocking(move || db.close()).await
    }
}

/// Tarball bytes in `tarballs.db`.
pub struct SqliteTarballStore {
    db: DieselDatabase,
}

impl SqliteTarballStore {
    pub fn new(db: DieselDatabase) -> Self {
        Self {
            db,
        }
    }
}

#[async_trait]
impl TarballStore for SqliteTarballStore {
    async fn get(&self, id: &str) -> MirrorResult<Option<Vec<u8>>> {
        let db = self.db.clone();
        let id = id.to_string();
        let row =
            run_blocking(move || db.with_conn(|conn| TarballRepository::find(conn, &id))).await?;
        Ok(row.map(|row| row.data))
    }

    async fn put(&self, id: &str, bytes: &[u8]) -> MirrorResult<bool> {
        let db = self.db.clone();
        let id = id.to_string();
        let data = bytes.to_vec();

        let inserted = run_blocking(move || {
            let created_at = now();
            db.with_conn(|conn| {
                TarballRepository::insert_or_ignore(
                    conn,
                    &NewTarball {
                        id: &id,
                        data: &data,
                        size: data.len() as i64,
                        created_at: &created_at,
                    },
                )
            })
        })
        .await?;
        Ok(inserted > 0)
    }

    async fn exists(&self, id: &str) -> MirrorResult<bool> {
        let db = self.db.clone();
        let id = id.to_string();
        run_blocking(move || db.with_conn(|conn| TarballRepository::exists(conn, &id))).await
    }

    async fn count(&self) -> MirrorResult<u64> {
        let db = self.db.clone();
        let count = run_blocking(move || db.with_conn(TarballRepository::count)).await?;
        Ok(count.max(0) as u64)
    }

    async fn close(&self) -> MirrorResult<()> {
        let db = self.db.clone();
        run_blocking(move || db.close()).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tarn_db::migration::DbType;

    use super::*;

    fn documents() -> SqliteDocumentStore {
        SqliteDocumentStore::new(DieselDatabase::open_in_memory(DbType::Documents).unwrap())
    }

    fn tarballs() -> SqliteTarballStore {
        SqliteTarballStore::new(DieselDatabase::open_in_memory(DbType::Tarballs).unwrap())
    }

    fn doc(name: &str, version: &str) -> PackageDocument {
        serde_json::from_value(json!({
            "_rev": "99-ignored",
            "name": name,
            "versions": { version: { "dist": { "tarball": "", "shasum": "abc" } } },
            "dist-tags": { "latest": version },
        }))
        .unwrap()
    }

    #[test]
    fn test_next_revision() {
        let first = next_revision(None, "{}");
        assert!(first.starts_with("1-"));
        assert!(next_revision(Some(&first), "{}").starts_with("2-"));
        assert!(next_revision(Some("garbage"), "{}").starts_with("1-"));
        assert_ne!(next_revision(None, "{}"), next_revision(None, "{\"a\":1}"));
    }

    #[tokio::test]
    async fn test_put_get_assigns_revision() {
        let store = documents();
        let rev = store.put("left-pad", &doc("left-pad", "1.0.0")).await.unwrap();
        assert!(rev.starts_with("1-"));

        let stored = store.get("left-pad").await.unwrap().unwrap();
        assert_eq!(stored.revision.as_deref(), Some(rev.as_str()));
        assert!(stored.versions.contains_key("1.0.0"));
        assert!(store.get("right-pad").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_existing_conflicts() {
        let store = documents();
        store.put("left-pad", &doc("left-pad", "1.0.0")).await.unwrap();
        let err = store.put("left-pad", &doc("left-pad", "1.0.1")).await.unwrap_err();
        assert!(matches!(err, MirrorError::Conflict(name) if name == "left-pad"));
    }

    #[tokio::test]
    async fn test_replace_checks_revision() {
        let store = documents();
        let first = store.put("left-pad", &doc("left-pad", "1.0.0")).await.unwrap();

        let second = store
            .replace("left-pad", &first, &doc("left-pad", "1.0.1"))
            .await
            .unwrap();
        assert!(second.starts_with("2-"));

        let err = store
            .replace("left-pad", &first, &doc("left-pad", "1.0.2"))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Conflict(_)));

        let stored = store.get("left-pad").await.unwrap().unwrap();
        assert!(stored.versions.contains_key("1.0.1"));

        let err = store
            .replace("missing", &first, &doc("missing", "1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_remove_and_count() {
        let store = documents();
        store.put("a", &doc("a", "1.0.0")).await.unwrap();
        store.put("b", &doc("b", "1.0.0")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        assert!(store.remove("a").await.unwrap());
        assert!(!store.remove("a").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_round_trip() {
        let store = documents();
        let source = "https://replicate.npmjs.com/";
        assert!(store.checkpoint(source).await.unwrap().is_none());

        let seq = Seq(json!("42-g1AAAA"));
        store.set_checkpoint(source, &seq).await.unwrap();
        assert_eq!(store.checkpoint(source).await.unwrap(), Some(seq));
        assert!(store.checkpoint("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_store_rejects_use() {
        let store = documents();
        store.close().await.unwrap();
        store.close().await.unwrap();
        assert!(matches!(
            store.get("left-pad").await,
            Err(MirrorError::Store(DbError::Closed))
        ));
    }

    #[tokio::test]
    async fn test_put_uses_given_key() {
        let store = documents();
        store.put("left-pad", &doc("", "1.0.0")).await.unwrap();

        assert!(store.get("left-pad").await.unwrap().is_some());
        assert!(store.get("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tarball_put_never_overwrites() {
        let store = tarballs();
        assert!(store.put("left-pad-1.0.0", b"first").await.unwrap());
        assert!(!store.put("left-pad-1.0.0", b"second").await.unwrap());

        assert_eq!(
            store.get("left-pad-1.0.0").await.unwrap().unwrap(),
            b"first".to_vec()
        );
        assert!(store.exists("left-pad-1.0.0").await.unwrap());
        assert!(!store.exists("left-pad-2.0.0").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }
}

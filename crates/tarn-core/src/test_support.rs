//! In-memory stores and upstream stubs shared by the engine tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use tarn_db::migration::DbType;
use tarn_registry::{ChangesResponse, DbInfo, PackageDocument, Seq};
use tokio::time::{sleep, timeout};

use crate::{
    database::connection::DieselDatabase,
    error::MirrorError,
    store::{
        ChangeFeed, DocumentSource, SqliteDocumentStore, SqliteTarballStore, TarballFetcher,
    },
    MirrorResult,
};

pub fn memory_documents() -> SqliteDocumentStore {
    SqliteDocumentStore::new(DieselDatabase::open_in_memory(DbType::Documents).unwrap())
}

pub fn memory_tarballs() -> SqliteTarballStore {
    SqliteTarballStore::new(DieselDatabase::open_in_memory(DbType::Tarballs).unwrap())
}

/// Builds a document with `versions`, each pointing at a placeholder shasum.
pub fn package(name: &str, versions: &[&str], latest: Option<&str>, modified: &str) -> PackageDocument {
    let versions: serde_json::Map<_, _> = versions
        .iter()
        .map(|v| {
            (
                v.to_string(),
                json!({
                    "name": name,
                    "version": v,
                    "dist": {
                        "tarball": format!("https://registry.npmjs.org/{name}/-/{name}-{v}.tgz"),
                        "shasum": "0000000000000000000000000000000000000000",
                    },
                }),
            )
        })
        .collect();

    let mut doc = json!({
        "_id": name,
        "name": name,
        "versions": versions,
        "time": { "modified": modified, "created": "2020-01-01T00:00:00Z" },
    });
    if let Some(latest) = latest {
        doc["dist-tags"] = json!({ "latest": latest });
    }
    serde_json::from_value(doc).unwrap()
}

fn unreachable(target: &str) -> MirrorError {
    MirrorError::Unreachable {
        target: target.to_string(),
        reason: "connection refused".to_string(),
    }
}

/// Upstream document source backed by a map.
#[derive(Default)]
pub struct StubRemote {
    docs: Mutex<HashMap<String, PackageDocument>>,
    unreachable: AtomicBool,
    calls: AtomicUsize,
}

impl StubRemote {
    pub fn insert(&self, doc: PackageDocument) {
        let name = doc.name.clone();
        self.insert_as(&name, doc);
    }

    /// Serves `doc` for `name` regardless of the document's own `name`.
    pub fn insert_as(&self, name: &str, doc: PackageDocument) {
        self.docs.lock().unwrap().insert(name.to_string(), doc);
    }

    pub fn get(&self, name: &str) -> Option<PackageDocument> {
        self.docs.lock().unwrap().get(name).cloned()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for StubRemote {
    async fn fetch(&self, name: &str) -> MirrorResult<PackageDocument> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(unreachable(name));
        }
        self.get(name)
            .ok_or_else(|| MirrorError::NotFound(name.to_string()))
    }
}

/// Upstream tarball source backed by a map.
#[derive(Default)]
pub struct StubFetcher {
    tarballs: Mutex<HashMap<(String, String), Vec<u8>>>,
    unreachable: AtomicBool,
}

impl StubFetcher {
    pub fn insert(&self, name: &str, version: &str, bytes: Vec<u8>) {
        self.tarballs
            .lock()
            .unwrap()
            .insert((name.to_string(), version.to_string()), bytes);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl TarballFetcher for StubFetcher {
    async fn fetch(&self, name: &str, version: &str) -> MirrorResult<Vec<u8>> {
        let target = format!("{name}@{version}");
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(unreachable(&target));
        }
        self.tarballs
            .lock()
            .unwrap()
            .get(&(name.to_string(), version.to_string()))
            .cloned()
            .ok_or(MirrorError::NotFound(target))
    }
}

/// Change feed replaying scripted responses.
///
/// Once the script runs out, `changes` blocks like an idle longpoll.
pub struct StubFeed {
    update_seq: u64,
    script: Mutex<VecDeque<MirrorResult<ChangesResponse>>>,
    requests: Mutex<Vec<Seq>>,
}

impl StubFeed {
    pub fn new(update_seq: u64) -> Self {
        Self {
            update_seq,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, response: MirrorResult<ChangesResponse>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn push_changes(&self, changes: serde_json::Value) {
        self.push(Ok(serde_json::from_value(changes).unwrap()));
    }

    pub fn push_error(&self) {
        self.push(Err(unreachable("feed")));
    }

    /// `since` values of every request, in order.
    pub fn requests(&self) -> Vec<Seq> {
        self.requests.lock().unwrap().clone()
    }

    /// Waits until the feed has been polled at least `count` times.
    ///
    /// A consumer asking for more has finished applying everything before.
    pub async fn wait_for_requests(&self, count: usize) {
        timeout(Duration::from_secs(5), async {
            while self.requests.lock().unwrap().len() < count {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}

#[async_trait]
impl ChangeFeed for StubFeed {
    fn source(&self) -> &str {
        "https://feed.test/"
    }

    async fn info(&self) -> MirrorResult<DbInfo> {
        Ok(serde_json::from_value(json!({ "update_seq": self.update_seq })).unwrap())
    }

    async fn changes(&self, since: &Seq, _limit: u32) -> MirrorResult<ChangesResponse> {
        self.requests.lock().unwrap().push(since.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(response) => response,
            None => std::future::pending().await,
        }
    }
}

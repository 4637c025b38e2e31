use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tarn_dl::http::Http;
use tracing::debug;
use url::Url;

use crate::error::{RegistryError, Result};

/// A change-feed sequence.
///
/// CouchDB 1.x uses integers, 2.x opaque strings such as `"123-g1AA..."`.
/// Both are echoed back verbatim as `since`; only the numeric prefix is
/// interpreted, for progress reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seq(pub Value);

impl Seq {
    pub fn zero() -> Self {
        Seq(Value::from(0))
    }

    /// Leading integer of the sequence, `0` if there is none.
    pub fn numeric(&self) -> u64 {
        match &self.0 {
            Value::Number(n) => n.as_u64().unwrap_or(0),
            Value::String(s) => {
                let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            }
            _ => 0,
        }
    }

    pub fn to_json(&self) -> String {
        self.0.to_string()
    }

    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok().map(Seq)
    }
}

impl Default for Seq {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

/// Database info served at the feed root.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DbInfo {
    #[serde(default)]
    pub update_seq: Seq,

    #[serde(default)]
    pub db_name: Option<String>,

    #[serde(default)]
    pub doc_count: Option<u64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    pub seq: Seq,
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    /// Raw document, present with `include_docs=true`.
    #[serde(default)]
    pub doc: Option<Value>,
}

impl Change {
    /// Design documents and other `_`-prefixed ids are not packages.
    pub fn is_package(&self) -> bool {
        !self.id.starts_with('_')
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangesResponse {
    #[serde(default)]
    pub results: Vec<Change>,
    pub last_seq: Seq,
}

/// Blocking client for a CouchDB-style `_changes` feed.
#[derive(Debug, Clone)]
pub struct ChangeFeedClient {
    base: Url,
    request_timeout: Duration,
    max_response_size: u64,
}

impl ChangeFeedClient {
    pub fn new(base: &str, request_timeout: Duration, max_response_size: u64) -> Result<Self> {
        let mut base = Url::parse(base).map_err(|_| RegistryError::InvalidUrl(base.into()))?;
        if base.cannot_be_a_base() {
            return Err(RegistryError::InvalidUrl(base.into()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            request_timeout,
            max_response_size,
        })
    }

    /// Feed URL, used as the checkpoint key.
    pub fn source(&self) -> &str {
        self.base.as_str()
    }

    pub fn info(&self) -> Result<DbInfo> {
        Ok(Http::get_json(
            self.base.as_str(),
            self.request_timeout,
            self.max_response_size,
        )?)
    }

    pub fn changes_url(&self, since: &Seq, limit: u32, longpoll: Duration) -> Result<Url> {
        let mut url = self
            .base
            .join("_changes")
            .map_err(|_| RegistryError::InvalidUrl(self.base.to_string()))?;

        url.query_pairs_mut()
            .append_pair("since", &since.to_string())
            .append_pair("limit", &limit.to_string())
            .append_pair("include_docs", "true")
            .append_pair("feed", "longpoll")
            .append_pair("timeout", &longpoll.as_millis().to_string());
        Ok(url)
    }

    /// Long-polls for up to `limit` changes after `since`.
    ///
    /// The request may stay open for `longpoll` before the regular request
    /// timeout starts counting.
    pub fn changes(&self, since: &Seq, limit: u32, longpoll: Duration) -> Result<ChangesResponse> {
        let url = self.changes_url(since, limit, longpoll)?;
        debug!(%since, limit, "polling change feed");

        Ok(Http::get_json(
            url.as_str(),
            self.request_timeout + longpoll,
            self.max_response_size,
        )?)
    }
}

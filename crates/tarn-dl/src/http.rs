use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    error::{FetchError, Result},
    http_client::SHARED_AGENT,
};

pub struct Http;

impl Http {
    /// Downloads `url` into memory.
    ///
    /// The whole exchange, body included, must finish within `timeout`, and
    /// bodies larger than `limit` bytes are rejected.
    pub fn get_bytes(url: &str, timeout: Duration, limit: u64) -> Result<Vec<u8>> {
        debug!(url, ?timeout, "GET");

        let mut response = SHARED_AGENT
            .get(url)
            .config()
            .timeout_global(Some(timeout))
            .build()
            .call()
            .map_err(|err| FetchError::from_ureq(url, err))?;

        response
            .body_mut()
            .with_config()
            .limit(limit)
            .read_to_vec()
            .map_err(|err| FetchError::from_ureq(url, err))
    }

    /// Fetches `url` and decodes the body as JSON.
    pub fn get_json<T: DeserializeOwned>(url: &str, timeout: Duration, limit: u64) -> Result<T> {
        let bytes = Self::get_bytes(url, timeout, limit)?;
        decode_json(url, &bytes)
    }
}

fn decode_json<T: DeserializeOwned>(url: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|err| {
        FetchError::InvalidResponse {
            url: url.to_string(),
            reason: err.to_string(),
        }
    })
}

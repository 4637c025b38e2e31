use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tarn_dl::http::Http;
use tracing::debug;
use url::Url;

use crate::{
    document::PackageDocument,
    error::{RegistryError, Result},
};

/// Characters left alone in a document path. `/` of scoped names is encoded.
const NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'@')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Blocking client for an npm-style registry.
#[derive(Debug, Clone)]
pub struct RemoteRegistry {
    base: Url,
    metadata_timeout: Duration,
    max_document_size: u64,
}

impl RemoteRegistry {
    pub fn new(base: &str, metadata_timeout: Duration, max_document_size: u64) -> Result<Self> {
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
            metadata_timeout,
            max_document_size,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `GET {remote}/{name}` with a scoped name's `/` encoded as `%2F`.
    pub fn document_url(&self, name: &str) -> Result<Url> {
        if name.is_empty() {
            return Err(RegistryError::InvalidName(name.into()));
        }
        let encoded = utf8_percent_encode(name, NAME_ENCODE_SET).to_string();
        self.base
            .join(&encoded)
            .map_err(|_| RegistryError::InvalidName(name.into()))
    }

    /// `{remote}/tarballs/{name}/{version}.tgz`, scope kept as a path segment.
    pub fn tarball_url(&self, name: &str, version: &str) -> Result<Url> {
        if name.is_empty() || version.is_empty() {
            return Err(RegistryError::InvalidName(format!("{name}@{version}")));
        }

        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RegistryError::InvalidUrl(self.base.to_string()))?;
            segments.pop_if_empty().push("tarballs");
            for part in name.split('/') {
                segments.push(part);
            }
            segments.push(&format!("{version}.tgz"));
        }
        Ok(url)
    }

    /// Fetches the full package document of `name`.
    pub fn fetch_document(&self, name: &str) -> Result<PackageDocument> {
        let url = self.document_url(name)?;
        debug!(name, %url, "fetching package document");

        let bytes = Http::get_bytes(url.as_str(), self.metadata_timeout, self.max_document_size)?;
        Ok(PackageDocument::from_json(&bytes)?)
    }

    /// Downloads a release archive within `timeout`.
    pub fn fetch_tarball(
        &self,
        name: &str,
        version: &str,
        timeout: Duration,
        limit: u64,
    ) -> Result<Vec<u8>> {
        let url = self.tarball_url(name, version)?;
        debug!(name, version, %url, "downloading tarball");

        Ok(Http::get_bytes(url.as_str(), timeout, limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(base: &str) -> RemoteRegistry {
        RemoteRegistry::new(base, Duration::from_secs(5), 1024).unwrap()
    }

    #[test]
    fn test_document_url() {
        let remote = registry("https://registry.npmjs.org");
        assert_eq!(
            remote.document_url("left-pad").unwrap().as_str(),
            "https://registry.npmjs.org/left-pad"
        );
        assert_eq!(
            remote.document_url("@babel/core").unwrap().as_str(),
            "https://registry.npmjs.org/@babel%2Fcore"
        );
        assert!(remote.document_url("").is_err());
    }

    #[test]
    fn test_document_url_keeps_base_path() {
        let remote = registry("http://localhost:5984/registry");
        assert_eq!(
            remote.document_url("left-pad").unwrap().as_str(),
            "http://localhost:5984/registry/left-pad"
        );
    }

    #[test]
    fn test_tarball_url() {
        let remote = registry("https://registry.npmjs.org/");
        assert_eq!(
            remote.tarball_url("left-pad", "1.3.0").unwrap().as_str(),
            "https://registry.npmjs.org/tarballs/left-pad/1.3.0.tgz"
        );
        assert_eq!(
            remote.tarball_url("@babel/core", "7.0.0").unwrap().as_str(),
            "https://registry.npmjs.org/tarballs/@babel/core/7.0.0.tgz"
        );
        assert!(remote.tarball_url("left-pad", "").is_err());
    }

    #[test]
    fn test_invalid_base() {
        assert!(matches!(
            RemoteRegistry::new("not a url", Duration::from_secs(1), 1),
            Err(RegistryError::InvalidUrl(_))
        ));
        assert!(RemoteRegistry::new("mailto:someone@example.com", Duration::from_secs(1), 1).is_err());
    }
}

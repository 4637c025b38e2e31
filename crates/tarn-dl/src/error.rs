use std::io;

use miette::Diagnostic;
use thiserror::Error;

/// Coarse classification of a failed upstream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The host could not be reached at all.
    Unreachable,
    /// Upstream answered 404.
    NotFound,
    /// The request did not finish within its deadline.
    Timeout,
    Other,
}

#[derive(Error, Diagnostic, Debug)]
pub enum FetchError {
    #[error("Not found: {url}")]
    #[diagnostic(code(tarn_dl::not_found))]
    NotFound { url: String },

    #[error("HTTP {status}: {url}")]
    #[diagnostic(code(tarn_dl::http_error))]
    HttpStatus { status: u16, url: String },

    #[error("Upstream unreachable: {url}")]
    #[diagnostic(
        code(tarn_dl::unreachable),
        help("Check your internet connection or the configured remote")
    )]
    Unreachable {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("Request timed out: {url}")]
    #[diagnostic(
        code(tarn_dl::timeout),
        help("Increase the corresponding timeout in your config")
    )]
    Timeout { url: String },

    #[error("Response from {url} exceeds {limit} bytes")]
    #[diagnostic(
        code(tarn_dl::too_large),
        help("Raise max_document_size or max_tarball_size")
    )]
    TooLarge { url: String, limit: u64 },

    #[error("Invalid response from {url}: {reason}")]
    #[diagnostic(code(tarn_dl::invalid_response))]
    InvalidResponse { url: String, reason: String },

    #[error(transparent)]
    #[diagnostic(
        code(tarn_dl::network),
        help("Check your internet connection or try again later")
    )]
    Network(#[from] Box<ureq::Error>),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::NotFound { .. } => FetchErrorKind::NotFound,
            FetchError::Unreachable { .. } => FetchErrorKind::Unreachable,
            FetchError::Timeout { .. } => FetchErrorKind::Timeout,
            _ => FetchErrorKind::Other,
        }
    }

    /// Classifies a transport error for the request to `url`.
    pub fn from_ureq(url: &str, err: ureq::Error) -> Self {
        let url = url.to_string();
        match err {
            ureq::Error::StatusCode(404) => FetchError::NotFound { url },
            ureq::Error::StatusCode(status) => FetchError::HttpStatus { status, url },
            ureq::Error::Timeout(_) => FetchError::Timeout { url },
            ureq::Error::BodyExceedsLimit(limit) => FetchError::TooLarge { url, limit },
            ureq::Error::Io(ref io_err) if io_err.kind() == io::ErrorKind::TimedOut => {
                FetchError::Timeout { url }
            }
            ureq::Error::Io(ref io_err) if is_unreachable_io(io_err.kind()) => {
                FetchError::Unreachable {
                    url,
                    source: Box::new(err),
                }
            }
            ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
                FetchError::Unreachable {
                    url,
                    source: Box::new(err),
                }
            }
            other => FetchError::Network(Box::new(other)),
        }
    }
}

fn is_unreachable_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
    )
}

pub type Result<T> = std::result::Result<T, FetchError>;

//! Error types for the registry crate.

use miette::Diagnostic;
use tarn_dl::error::{FetchError, FetchErrorKind};
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    #[diagnostic(
        code(tarn_registry::fetch),
        help("Check your network connection and the configured remote")
    )]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    #[diagnostic(
        code(tarn_registry::json),
        help("The document may be corrupted or in an unexpected format")
    )]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    #[diagnostic(
        code(tarn_registry::invalid_url),
        help("Ensure the configured remote is a valid absolute URL")
    )]
    InvalidUrl(String),

    #[error("Invalid package name: {0}")]
    #[diagnostic(code(tarn_registry::invalid_name))]
    InvalidName(String),
}

impl RegistryError {
    /// Upstream failure class, if this error came from the network.
    pub fn fetch_kind(&self) -> Option<FetchErrorKind> {
        match self {
            RegistryError::Fetch(err) => Some(err.kind()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

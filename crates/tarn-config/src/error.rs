use miette::Diagnostic;
use tarn_utils::error::{FileSystemError, PathError, UtilsError};
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(tarn_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(tarn_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Configuration file already exists")]
    #[diagnostic(
        code(tarn_config::already_exists),
        help("Remove the existing config file or use a different location")
    )]
    ConfigAlreadyExists,

    #[error("Invalid URL for `{field}`: {value}")]
    #[diagnostic(
        code(tarn_config::invalid_url),
        help("Use an absolute http:// or https:// URL")
    )]
    InvalidUrl { field: &'static str, value: String },

    #[error("Invalid duration for `{field}`: {value}")]
    #[diagnostic(
        code(tarn_config::invalid_duration),
        help("Use a duration like `200ms`, `30s`, `5m` or `1h`")
    )]
    InvalidDuration { field: &'static str, value: String },

    #[error("Invalid value for `{field}`: {reason}")]
    #[diagnostic(code(tarn_config::invalid_value))]
    InvalidValue { field: &'static str, reason: String },

    #[error("IO error: {0}")]
    #[diagnostic(code(tarn_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(tarn_config::utils))]
    Utils(#[from] UtilsError),
}

impl From<PathError> for ConfigError {
    fn from(err: PathError) -> Self {
        Self::Utils(UtilsError::Path(err))
    }
}

impl From<FileSystemError> for ConfigError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(UtilsError::FileSystem(err))
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

use std::{
    fs,
    path::PathBuf,
    sync::{LazyLock, RwLock},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tarn_utils::path::{resolve_path, xdg_config_home, xdg_data_home};
use tracing::info;
use url::Url;

use crate::{
    error::{ConfigError, Result},
    replication::{duration_field, ReplicationConfig},
};

const DEFAULT_REMOTE: &str = "https://registry.npmjs.org";
const DEFAULT_REMOTE_SKIM: &str = "https://replicate.npmjs.com";

/// Mirror configuration
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Upstream registry serving package documents and tarballs.
    pub remote: String,

    /// Upstream change feed used for replication.
    pub remote_skim: String,

    /// Storage directory holding `documents.db` and `tarballs.db`.
    /// Default: $XDG_DATA_HOME/tarn
    pub directory: Option<String>,

    /// Public URL of this mirror, used when rewriting `dist.tarball`.
    pub base_url: Option<String>,

    /// Timeout for metadata requests to `remote`.
    pub metadata_timeout: String,

    /// Hard timeout for upstream tarball downloads.
    pub tarball_timeout: String,

    /// Largest package document accepted from upstream, in bytes.
    pub max_document_size: u64,

    /// Largest tarball accepted from upstream, in bytes.
    pub max_tarball_size: u64,

    /// Cached tarballs smaller than this are treated as corrupt.
    pub min_tarball_size: u64,

    /// User agent sent to upstream.
    pub user_agent: Option<String>,

    /// Proxy for upstream requests.
    pub proxy: Option<String>,

    pub replication: ReplicationConfig,
}

pub static CONFIG: LazyLock<RwLock<Option<Config>>> = LazyLock::new(|| RwLock::new(None));

pub static CONFIG_PATH: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    RwLock::new(match std::env::var("TARN_CONFIG") {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => xdg_config_home().join("tarn").join("config.toml"),
    })
});

pub fn init() -> Result<()> {
    let config = Config::new()?;
    let mut global_config = CONFIG.write().unwrap();
    *global_config = Some(config);
    Ok(())
}

pub fn set_config_path(path: PathBuf) {
    let mut config_path = CONFIG_PATH.write().unwrap();
    *config_path = path;
}

pub fn get_config() -> Config {
    {
        let config_guard = CONFIG.read().unwrap();
        if let Some(config) = config_guard.as_ref() {
            return config.clone();
        }
    }

    let mut config_guard = CONFIG.write().unwrap();
    config_guard.get_or_insert_with(Config::default).clone()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: DEFAULT_REMOTE.to_string(),
            remote_skim: DEFAULT_REMOTE_SKIM.to_string(),
            directory: Some(format!("{}/tarn", xdg_data_home().display())),
            base_url: None,
            metadata_timeout: "30s".to_string(),
            tarball_timeout: "2s".to_string(),
            max_document_size: 64 * 1024 * 1024,
            max_tarball_size: 256 * 1024 * 1024,
            min_tarball_size: 100,
            user_agent: None,
            proxy: None,
            replication: ReplicationConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration file, or the defaults when it doesn't exist.
    pub fn new() -> Result<Self> {
        let config_path = CONFIG_PATH.read().unwrap().to_path_buf();

        let config = match fs::read_to_string(&config_path) {
            Ok(content) => Self::from_toml(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        check_url("remote", &self.remote)?;
        check_url("remote_skim", &self.remote_skim)?;
        if let Some(base_url) = &self.base_url {
            check_url("base_url", base_url)?;
        }
        if let Some(proxy) = &self.proxy {
            check_url("proxy", proxy)?;
        }

        self.metadata_timeout()?;
        self.tarball_timeout()?;

        if self.max_tarball_size < self.min_tarball_size {
            return Err(ConfigError::InvalidValue {
                field: "max_tarball_size",
                reason: "must not be smaller than min_tarball_size".into(),
            });
        }
        if self.max_document_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_document_size",
                reason: "must be greater than zero".into(),
            });
        }

        self.replication.validate()
    }

    /// Resolved storage directory. `TARN_DIRECTORY` takes precedence.
    pub fn get_directory(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("TARN_DIRECTORY") {
            return Ok(resolve_path(&env_path)?);
        }
        match &self.directory {
            Some(dir) => Ok(resolve_path(dir)?),
            None => Ok(xdg_data_home().join("tarn")),
        }
    }

    pub fn get_documents_db_path(&self) -> Result<PathBuf> {
        Ok(self.get_directory()?.join("documents.db"))
    }

    pub fn get_tarballs_db_path(&self) -> Result<PathBuf> {
        Ok(self.get_directory()?.join("tarballs.db"))
    }

    /// Base URL written into served `dist.tarball` fields.
    pub fn public_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or("http://127.0.0.1:5080")
            .trim_end_matches('/')
    }

    pub fn remote_url(&self) -> &str {
        self.remote.trim_end_matches('/')
    }

    pub fn remote_skim_url(&self) -> &str {
        self.remote_skim.trim_end_matches('/')
    }

    pub fn metadata_timeout(&self) -> Result<Duration> {
        duration_field("metadata_timeout", &self.metadata_timeout)
    }

    pub fn tarball_timeout(&self) -> Result<Duration> {
        duration_field("tarball_timeout", &self.tarball_timeout)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("tarn/{}", env!("CARGO_PKG_VERSION")))
    }

    pub fn save(&self) -> Result<()> {
        let config_path = CONFIG_PATH.read().unwrap().to_path_buf();
        let serialized = toml::to_string_pretty(self)?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&config_path, serialized)?;
        info!("Configuration saved to {}", config_path.display());
        Ok(())
    }
}

fn check_url(field: &'static str, value: &str) -> Result<()> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
        _ => {
            Err(ConfigError::InvalidUrl {
                field,
                value: value.to_string(),
            })
        }
    }
}

/// Writes the default configuration to [`CONFIG_PATH`], refusing to overwrite.
pub fn generate_default_config() -> Result<PathBuf> {
    let config_path = CONFIG_PATH.read().unwrap().to_path_buf();

    if config_path.exists() {
        return Err(ConfigError::ConfigAlreadyExists);
    }

    let serialized = toml::to_string_pretty(&Config::default())?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&config_path, serialized)?;
    info!(
        "Default configuration file generated at: {}",
        config_path.display()
    );
    Ok(config_path)
}

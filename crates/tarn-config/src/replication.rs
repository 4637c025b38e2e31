use std::time::Duration;

use serde::{Deserialize, Serialize};
use tarn_utils::time::parse_duration;

use crate::error::{ConfigError, Result};

/// Tuning for the background change-feed consumer.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Whether `tarn replicate` and the mirror context start the feed consumer.
    pub enabled: bool,

    /// Number of changes requested per feed poll.
    pub batch_size: u32,

    /// Delay before the first retry after a feed error.
    pub initial_backoff: String,

    /// Multiplier applied to the delay after every consecutive failure.
    pub backoff_factor: f64,

    /// Upper bound for the retry delay.
    pub max_backoff: String,

    /// How long the feed may hold a longpoll request open.
    pub longpoll_timeout: String,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 200,
            initial_backoff: "1s".to_string(),
            backoff_factor: 1.1,
            max_backoff: "5m".to_string(),
            longpoll_timeout: "30s".to_string(),
        }
    }
}

impl ReplicationConfig {
    pub fn initial_backoff(&self) -> Result<Duration> {
        duration_field("replication.initial_backoff", &self.initial_backoff)
    }

    pub fn max_backoff(&self) -> Result<Duration> {
        duration_field("replication.max_backoff", &self.max_backoff)
    }

    pub fn longpoll_timeout(&self) -> Result<Duration> {
        duration_field("replication.longpoll_timeout", &self.longpoll_timeout)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "replication.batch_size",
                reason: "must be at least 1".into(),
            });
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "replication.backoff_factor",
                reason: format!("must be greater than 1, got {}", self.backoff_factor),
            });
        }

        let initial = self.initial_backoff()?;
        let max = self.max_backoff()?;
        if initial.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "replication.initial_backoff",
                reason: "must be greater than zero".into(),
            });
        }
        if max < initial {
            return Err(ConfigError::InvalidValue {
                field: "replication.max_backoff",
                reason: "must not be shorter than initial_backoff".into(),
            });
        }
        self.longpoll_timeout()?;

        Ok(())
    }
}

pub(crate) fn duration_field(field: &'static str, value: &str) -> Result<Duration> {
    let invalid = || {
        ConfigError::InvalidDuration {
            field,
            value: value.to_string(),
        }
    };

    if value.trim().is_empty() {
        return Err(invalid());
    }
    parse_duration(value).ok_or_else(invalid)
}

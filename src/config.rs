//! Engine configuration.
//!
//! Settings can be given one by one on
//! [`ChangeSetBuilder`](crate::engine::ChangeSetBuilder), or loaded in one go
//! from a [`ChangeSetConfig`], which deserializes from JSON:
//!
//! ```
//! use change_kit::config::{ChangeSetConfig, ExpiryPolicy};
//! use change_kit::strategy::SourceStrategy;
//! use std::time::Duration;
//!
//! let config = ChangeSetConfig::from_json(
//!     r#"{ "limit_size_to": 100, "strategy": "replace", "expiry": { "fixed": { "secs": 30, "nanos": 0 } } }"#,
//! ).unwrap();
//!
//! assert_eq!(config.limit_size_to, 100);
//! assert_eq!(config.strategy, SourceStrategy::Replace);
//! assert_eq!(config.expiry.get_expiry(), Some(Duration::from_secs(30)));
//! ```
//!
//! # Precedence
//!
//! An expiry closure given to `ChangeSetBuilder::expire_after` always wins over
//! the config's [`ExpiryPolicy`], the same way a per-value duration is more
//! specific than a blanket one.

use crate::error::{Error, Result};
use crate::strategy::SourceStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Expiry policy applied to every value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Values live until removed or evicted.
    #[default]
    Never,

    /// Every value expires this long after it was last added or updated.
    Fixed(Duration),
}

impl ExpiryPolicy {
    pub fn get_expiry(&self) -> Option<Duration> {
        match self {
            ExpiryPolicy::Never => None,
            ExpiryPolicy::Fixed(d) => Some(*d),
        }
    }
}

/// Serializable engine settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeSetConfig {
    /// Maximum number of entries. `0` means unbounded.
    pub limit_size_to: usize,

    pub expiry: ExpiryPolicy,

    pub strategy: SourceStrategy,

    /// Longest time a pause gate may hold change sets. `None` = no limit.
    /// Used by `ChangeSetStream::buffer_if` when it is given no timeout.
    pub pause_timeout: Option<Duration>,
}

impl ChangeSetConfig {
    /// Parse and validate a JSON config.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for malformed JSON or invalid settings.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ChangeSetConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_limit(mut self, limit_size_to: usize) -> Self {
        self.limit_size_to = limit_size_to;
        self
    }

    pub fn with_expiry(mut self, expiry: ExpiryPolicy) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_strategy(mut self, strategy: SourceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_pause_timeout(mut self, timeout: Duration) -> Self {
        self.pause_timeout = Some(timeout);
        self
    }

    /// # Errors
    /// Returns `Error::ConfigError` if the pause timeout is zero.
    pub fn validate(&self) -> Result<()> {
        validate_pause_timeout(self.pause_timeout)
    }
}

pub(crate) fn validate_pause_timeout(timeout: Option<Duration>) -> Result<()> {
    match timeout {
        Some(t) if t.is_zero() => Err(Error::ConfigError(
            "pause timeout must be greater than zero".to_string(),
        )),
        _ => Ok(()),
    }
}

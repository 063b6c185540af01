//! Sync engine configuration
//!
//! Provides the tunable knobs of the synchronization engine with validated
//! defaults, a builder, and TOML file loading.

use crate::model::collections;
use crate::offline::retry::BackoffPolicy;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default periodic flush interval while operations are pending
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 15;
/// Default backend reachability probe interval
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;
/// Default maximum operations taken per flush cycle
const DEFAULT_FLUSH_BATCH_SIZE: usize = 25;
/// Default push attempt ceiling before an operation is parked as failed
const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Default exponential backoff base
const DEFAULT_BACKOFF_BASE_SECS: u64 = 2;
/// Default exponential backoff cap
const DEFAULT_BACKOFF_CAP_SECS: u64 = 60;
/// Default queue depth that triggers a user-visible warning
const DEFAULT_QUEUE_HIGH_WATER: usize = 500;

/// Configuration for the auto-sync manager and its collaborators.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Periodic flush interval (seconds) while operations are pending
    pub flush_interval_secs: u64,
    /// Backend reachability probe interval (seconds)
    pub probe_interval_secs: u64,
    /// Maximum operations taken per flush cycle
    pub flush_batch_size: usize,
    /// Push attempt ceiling; beyond it an operation is parked as failed
    pub max_attempts: u32,
    /// Exponential backoff base (seconds); zero retries immediately
    pub backoff_base_secs: u64,
    /// Exponential backoff cap (seconds)
    pub backoff_cap_secs: u64,
    /// Queue depth above which a warning is logged (nothing is dropped)
    pub queue_high_water: usize,
    /// Collections kept in sync with the backend
    pub collections: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            flush_batch_size: DEFAULT_FLUSH_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            backoff_cap_secs: DEFAULT_BACKOFF_CAP_SECS,
            queue_high_water: DEFAULT_QUEUE_HIGH_WATER,
            collections: collections::default_set(),
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Load configuration from a TOML file; missing keys fall back to defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from a TOML string; missing keys fall back to defaults.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("flush_interval_secs must be > 0"));
        }
        if self.probe_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("probe_interval_secs must be > 0"));
        }
        if self.flush_batch_size == 0 {
            return Err(ConfigError::InvalidValue("flush_batch_size must be > 0"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue("max_attempts must be > 0"));
        }
        if self.backoff_cap_secs < self.backoff_base_secs {
            return Err(ConfigError::InvalidValue(
                "backoff_cap_secs must be >= backoff_base_secs",
            ));
        }
        if self.collections.is_empty() {
            return Err(ConfigError::InvalidValue("collections must not be empty"));
        }
        Ok(())
    }

    /// Periodic flush interval
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Reachability probe interval
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// The retry backoff policy derived from this configuration
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_secs(self.backoff_base_secs),
            Duration::from_secs(self.backoff_cap_secs),
        )
    }
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: Option<SyncConfig>,
}

impl SyncConfigBuilder {
    fn config(&mut self) -> &mut SyncConfig {
        self.config.get_or_insert_with(SyncConfig::default)
    }

    /// Set the periodic flush interval in seconds
    pub fn flush_interval_secs(mut self, secs: u64) -> Self {
        self.config().flush_interval_secs = secs;
        self
    }

    /// Set the reachability probe interval in seconds
    pub fn probe_interval_secs(mut self, secs: u64) -> Self {
        self.config().probe_interval_secs = secs;
        self
    }

    /// Set the maximum operations per flush cycle
    pub fn flush_batch_size(mut self, size: usize) -> Self {
        self.config().flush_batch_size = size;
        self
    }

    /// Set the push attempt ceiling
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config().max_attempts = attempts;
        self
    }

    /// Set the exponential backoff base in seconds
    pub fn backoff_base_secs(mut self, secs: u64) -> Self {
        self.config().backoff_base_secs = secs;
        self
    }

    /// Set the exponential backoff cap in seconds
    pub fn backoff_cap_secs(mut self, secs: u64) -> Self {
        self.config().backoff_cap_secs = secs;
        self
    }

    /// Set the queue high-water warning threshold
    pub fn queue_high_water(mut self, depth: usize) -> Self {
        self.config().queue_high_water = depth;
        self
    }

    /// Set the synchronized collections
    pub fn collections(mut self, collections: Vec<String>) -> Self {
        self.config().collections = collections;
        self
    }

    /// Build the configuration
    pub fn build(mut self) -> Result<SyncConfig, ConfigError> {
        let config = self.config().clone();
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
    #[error("could not read config file: {0}")]
    Io(String),
    #[error("could not parse config file: {0}")]
    Parse(String),
}

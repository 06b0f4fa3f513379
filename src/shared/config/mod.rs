//! Sync configuration module
//!
//! Provides `SyncConfig`, its builder, and loading from TOML files and
//! environment variables.
//!
//! # Sources
//!
//! Values are layered: built-in defaults, then a TOML file (optional), then
//! `ZAPTAP_*` environment variables. Every source funnels through
//! `SyncConfigBuilder::build`, which validates the result.
//!
//! ```rust
//! use std::time::Duration;
//! use zaptap_sync::shared::config::SyncConfig;
//!
//! let config = SyncConfig::builder()
//!     .max_attempts(3)
//!     .sync_interval(Duration::from_secs(10))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.max_attempts, 3);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::offline::retry::{BackoffStrategy, RetryPolicy};

/// Default reachability endpoint (answers 204 with an empty body)
pub const DEFAULT_REACHABILITY_URL: &str = "https://clients3.google.com/generate_204";

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Sync core configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Attempts before an operation is dead-lettered
    pub max_attempts: u32,
    /// Delay curve applied between attempts of a failed operation
    pub backoff: BackoffStrategy,
    /// Periodic drain interval while connected
    pub sync_interval: Duration,
    /// Endpoint used by the reachability probe
    pub reachability_url: String,
    /// Timeout of a single reachability probe
    pub probe_timeout: Duration,
    /// Delay between reachability probes while connected
    pub probe_interval: Duration,
    /// Execution timeout for kinds without an override
    pub default_operation_timeout: Duration,
    /// Execution timeout per operation kind
    pub operation_timeouts: HashMap<String, Duration>,
    /// SQLite file backing the queue
    pub database_path: PathBuf,
    /// Buffer size of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffStrategy::default(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            reachability_url: DEFAULT_REACHABILITY_URL.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            default_operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            operation_timeouts: HashMap::new(),
            database_path: default_database_path(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Defaults overridden by `ZAPTAP_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().apply_env()?.build()
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        file.apply(Self::builder()).build()
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let file: FileConfig =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        file.apply(Self::builder()).apply_env()?.build()
    }

    /// Execution timeout for an operation kind
    pub fn timeout_for(&self, kind: &str) -> Duration {
        self.operation_timeouts
            .get(kind)
            .copied()
            .unwrap_or(self.default_operation_timeout)
    }

    /// Retry policy derived from the attempt budget and backoff curve
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.backoff.clone())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.sync_interval.is_zero() {
            return Err(ConfigError::Invalid("sync_interval must be non-zero".into()));
        }
        if self.probe_timeout.is_zero() || self.probe_interval.is_zero() {
            return Err(ConfigError::Invalid("probe timeouts must be non-zero".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be non-zero".into()));
        }
        if self.reachability_url.is_empty() {
            return Err(ConfigError::MissingValue("reachability_url"));
        }
        reqwest::Url::parse(&self.reachability_url)
            .map_err(|_| ConfigError::InvalidUrl(self.reachability_url.clone()))?;
        Ok(())
    }
}

fn default_database_path() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
    path.push("zaptap");
    path.push("offline_queue.db");
    path
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Set the attempt budget
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Set the backoff curve
    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Set the periodic drain interval
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.config.sync_interval = interval;
        self
    }

    /// Set the reachability endpoint
    pub fn reachability_url(mut self, url: impl Into<String>) -> Self {
        self.config.reachability_url = url.into();
        self
    }

    /// Set the short (per-probe) timeout
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    /// Set the long (between probes) timeout
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.config.probe_interval = interval;
        self
    }

    /// Set the fallback execution timeout
    pub fn default_operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_operation_timeout = timeout;
        self
    }

    /// Override the execution timeout for one kind
    pub fn operation_timeout(mut self, kind: impl Into<String>, timeout: Duration) -> Self {
        self.config.operation_timeouts.insert(kind.into(), timeout);
        self
    }

    /// Set the SQLite file location
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = path.into();
        self
    }

    /// Set the event channel capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Apply `ZAPTAP_*` environment overrides
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(value) = std::env::var("ZAPTAP_MAX_ATTEMPTS") {
            self.config.max_attempts = value
                .parse()
                .map_err(|_| ConfigError::Parse(format!("ZAPTAP_MAX_ATTEMPTS={}", value)))?;
        }
        if let Ok(value) = std::env::var("ZAPTAP_SYNC_INTERVAL_SECS") {
            let secs: u64 = value
                .parse()
                .map_err(|_| ConfigError::Parse(format!("ZAPTAP_SYNC_INTERVAL_SECS={}", value)))?;
            self.config.sync_interval = Duration::from_secs(secs);
        }
        if let Ok(value) = std::env::var("ZAPTAP_REACHABILITY_URL") {
            self.config.reachability_url = value;
        }
        if let Ok(value) = std::env::var("ZAPTAP_DATABASE_PATH") {
            self.config.database_path = PathBuf::from(value);
        }
        Ok(self)
    }

    /// Build the configuration
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// On-disk TOML shape; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    max_attempts: Option<u32>,
    sync_interval_secs: Option<u64>,
    reachability_url: Option<String>,
    probe_timeout_secs: Option<u64>,
    probe_interval_secs: Option<u64>,
    operation_timeout_secs: Option<u64>,
    operation_timeouts: HashMap<String, u64>,
    database_path: Option<PathBuf>,
    event_capacity: Option<usize>,
    backoff: Option<FileBackoff>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
enum FileBackoff {
    Fixed {
        interval_ms: u64,
    },
    Exponential {
        base_ms: u64,
        max_secs: u64,
        #[serde(default)]
        jitter: f64,
    },
}

impl FileConfig {
    fn apply(self, mut builder: SyncConfigBuilder) -> SyncConfigBuilder {
        if let Some(v) = self.max_attempts {
            builder = builder.max_attempts(v);
        }
        if let Some(v) = self.sync_interval_secs {
            builder = builder.sync_interval(Duration::from_secs(v));
        }
        if let Some(v) = self.reachability_url {
            builder = builder.reachability_url(v);
        }
        if let Some(v) = self.probe_timeout_secs {
            builder = builder.probe_timeout(Duration::from_secs(v));
        }
        if let Some(v) = self.probe_interval_secs {
            builder = builder.probe_interval(Duration::from_secs(v));
        }
        if let Some(v) = self.operation_timeout_secs {
            builder = builder.default_operation_timeout(Duration::from_secs(v));
        }
        for (kind, secs) in self.operation_timeouts {
            builder = builder.operation_timeout(kind, Duration::from_secs(secs));
        }
        if let Some(v) = self.database_path {
            builder = builder.database_path(v);
        }
        if let Some(v) = self.event_capacity {
            builder = builder.event_capacity(v);
        }
        if let Some(backoff) = self.backoff {
            builder = builder.backoff(match backoff {
                FileBackoff::Fixed { interval_ms } => BackoffStrategy::Fixed {
                    interval: Duration::from_millis(interval_ms),
                },
                FileBackoff::Exponential { base_ms, max_secs, jitter } => {
                    BackoffStrategy::Exponential {
                        base: Duration::from_millis(base_ms),
                        max: Duration::from_secs(max_secs),
                        jitter,
                    }
                }
            });
        }
        builder
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value: {0}")]
    Invalid(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("io error: {0}")]
    Io(String),
}

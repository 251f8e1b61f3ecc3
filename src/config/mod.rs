//! # Buildkeeper Configuration
//!
//! Layered configuration for the worker pool and the retry/fallback engine.
//!
//! ## Sources
//!
//! Later sources override earlier ones:
//!
//! 1. Built-in defaults ([`BuildkeeperConfig::default`])
//! 2. `config/buildkeeper.{toml,yaml,json}` (optional)
//! 3. `config/buildkeeper.{environment}.{toml,yaml,json}` (optional)
//! 4. Environment variables prefixed `BUILDKEEPER_`, nested with `__`,
//!    e.g. `BUILDKEEPER_WORKER__CONCURRENCY=8`
//!
//! The environment name comes from `BUILDKEEPER_ENV` and defaults to
//! `development`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use buildkeeper_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//!
//! let concurrency = config.config().worker.concurrency;
//! let retry_strategy = config.config().retry.to_strategy();
//! # Ok(())
//! # }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::constants::{
    DEFAULT_BUILD_TIMEOUT_SECONDS, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BACKOFF,
    DEFAULT_WORKER_CONCURRENCY, DEQUEUE_ERROR_BACKOFF, EMPTY_QUEUE_POLL_INTERVAL,
};
use crate::retry::{ErrorPatterns, RetryStrategy};

pub use loader::ConfigManager;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildkeeperConfig {
    pub worker: WorkerConfig,
    pub retry: RetryConfig,
}

impl BuildkeeperConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker.concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.concurrency",
                "0",
                "at least one worker loop is required",
            ));
        }

        if self.worker.default_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.default_timeout_seconds",
                "0",
                "the default build timeout must be positive",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.max_attempts",
                "0",
                "max attempts must be at least 1",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of independent dequeue loops
    pub concurrency: usize,
    /// Build timeout when neither the job nor its build config sets one
    pub default_timeout_seconds: u64,
    pub empty_queue_poll_interval_ms: u64,
    pub dequeue_error_backoff_ms: u64,
    /// Abort the build task when its timeout expires. When false the task is
    /// left running detached after the job has been failed.
    pub abort_build_on_timeout: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_WORKER_CONCURRENCY,
            default_timeout_seconds: DEFAULT_BUILD_TIMEOUT_SECONDS,
            empty_queue_poll_interval_ms: EMPTY_QUEUE_POLL_INTERVAL.as_millis() as u64,
            dequeue_error_backoff_ms: DEQUEUE_ERROR_BACKOFF.as_millis() as u64,
            abort_build_on_timeout: true,
        }
    }
}

impl WorkerConfig {
    pub fn empty_queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.empty_queue_poll_interval_ms)
    }

    pub fn dequeue_error_backoff(&self) -> Duration {
        Duration::from_millis(self.dequeue_error_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub retry_as_oci: bool,
    pub backoff_seconds: u64,
    pub patterns: ErrorPatterns,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_as_oci: true,
            backoff_seconds: DEFAULT_RETRY_BACKOFF.as_secs(),
            patterns: ErrorPatterns::default(),
        }
    }
}

impl RetryConfig {
    pub fn to_strategy(&self) -> RetryStrategy {
        RetryStrategy {
            max_attempts: self.max_attempts,
            retry_as_oci: self.retry_as_oci,
            backoff: Duration::from_secs(self.backoff_seconds),
            patterns: self.patterns.clone(),
        }
    }
}

impl From<&RetryConfig> for RetryStrategy {
    fn from(config: &RetryConfig) -> Self {
        config.to_strategy()
    }
}

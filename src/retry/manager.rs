use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use super::classifier::ErrorPatterns;
use crate::constants::{build_types, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BACKOFF, MAX_RETRIES};
use crate::error::BuildError;
use crate::models::{BuildJob, BuildType};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    #[error("build id cannot be empty")]
    EmptyBuildId,
}

/// One execution attempt, appended to a job's history and never changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildAttempt {
    pub attempt_number: u32,
    pub strategy: String,
    pub build_type: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub error: Option<String>,
}

impl BuildAttempt {
    /// A failed attempt of `job` in its current shape
    pub fn failed(job: &BuildJob, error: &BuildError) -> Self {
        Self {
            attempt_number: job.retry_count + 1,
            strategy: job.build_strategy.clone(),
            build_type: job.build_type.clone(),
            started_at: job.started_at.unwrap_or_else(Utc::now),
            completed_at: Some(Utc::now()),
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Emitted when a retry switches artifact type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackNotification {
    pub build_id: String,
    pub original_type: String,
    pub fallback_type: String,
    pub reason: String,
    pub attempt_number: u32,
    pub timestamp: DateTime<Utc>,
}

pub type NotificationCallback = Arc<dyn Fn(&FallbackNotification) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryStrategy {
    /// Ceiling on recorded attempts per job
    pub max_attempts: u32,
    /// Escalate native-toolchain failures of pure builds to OCI
    pub retry_as_oci: bool,
    /// Wait before a retried job is re-enqueued
    pub backoff: Duration,
    pub patterns: ErrorPatterns,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_as_oci: true,
            backoff: DEFAULT_RETRY_BACKOFF,
            patterns: ErrorPatterns::default(),
        }
    }
}

/// Per-job attempt history plus the retry/fallback decision rules.
///
/// The history map is the only shared mutable state; it sits behind a single
/// mutex and no I/O or callback runs while it is held.
pub struct RetryManager {
    strategy: RetryStrategy,
    attempts: Mutex<HashMap<String, Vec<BuildAttempt>>>,
    notification_callback: Option<NotificationCallback>,
}

impl RetryManager {
    pub fn new(strategy: RetryStrategy) -> Self {
        Self {
            strategy,
            attempts: Mutex::new(HashMap::new()),
            notification_callback: None,
        }
    }

    pub fn with_notification_callback(mut self, callback: NotificationCallback) -> Self {
        self.notification_callback = Some(callback);
        self
    }

    pub fn strategy(&self) -> &RetryStrategy {
        &self.strategy
    }

    pub fn patterns(&self) -> &ErrorPatterns {
        &self.strategy.patterns
    }

    /// Evaluated in order, stopping at the first negative: validation
    /// failures, the global retry ceiling, the attempt ceiling, then the
    /// retryable classification, then fallback classification for pure
    /// jobs.
    pub fn should_retry(&self, job: &BuildJob, err: &BuildError) -> bool {
        let patterns = &self.strategy.patterns;

        if patterns.is_validation_error(err) {
            debug!(job_id = %job.id, "Not retrying validation failure");
            return false;
        }

        if job.retry_count >= MAX_RETRIES {
            debug!(
                job_id = %job.id,
                retry_count = job.retry_count,
                max_retries = MAX_RETRIES,
                "Not retrying, retry ceiling reached"
            );
            return false;
        }

        let attempts = self.attempt_count(&job.id);
        if attempts >= self.strategy.max_attempts as usize {
            debug!(
                job_id = %job.id,
                attempts = attempts,
                max_attempts = self.strategy.max_attempts,
                "Not retrying, attempt ceiling reached"
            );
            return false;
        }

        if patterns.is_retryable_error(err) {
            return true;
        }

        // An OCI job has nothing left to fall back to
        self.strategy.retry_as_oci && !job.is_oci() && patterns.is_oci_fallback_error(err)
    }

    /// Copy of `job` for the next attempt: `retry_count` goes up by one, and a
    /// pure job whose last recorded attempt hit a fallback pattern becomes OCI.
    pub fn prepare_retry(&self, job: &BuildJob) -> Result<BuildJob, RetryError> {
        if job.id.is_empty() {
            return Err(RetryError::EmptyBuildId);
        }

        let last_error = self
            .get_last_attempt(&job.id)
            .and_then(|attempt| attempt.error)
            .unwrap_or_default();

        let mut retry_job = job.clone();
        retry_job.retry_count = job.retry_count + 1;

        if !job.is_oci()
            && self.strategy.retry_as_oci
            && self.strategy.patterns.matches_oci_fallback(&last_error)
        {
            retry_job.set_build_type(BuildType::Oci);
            retry_job.retry_as_oci = true;

            info!(
                job_id = %job.id,
                original_type = %job.build_type,
                attempt = retry_job.retry_count,
                reason = %last_error,
                "🔀 Falling back to OCI build for retry"
            );

            self.notify_fallback(FallbackNotification {
                build_id: job.id.clone(),
                original_type: job.build_type.clone(),
                fallback_type: build_types::OCI.to_string(),
                reason: last_error,
                attempt_number: retry_job.retry_count,
                timestamp: Utc::now(),
            });
        }

        Ok(retry_job)
    }

    fn notify_fallback(&self, notification: FallbackNotification) {
        if let Some(callback) = &self.notification_callback {
            callback(&notification);
        }
    }

    pub fn record_attempt(&self, build_id: &str, attempt: BuildAttempt) -> Result<(), RetryError> {
        if build_id.is_empty() {
            return Err(RetryError::EmptyBuildId);
        }

        self.attempts
            .lock()
            .entry(build_id.to_string())
            .or_default()
            .push(attempt);
        Ok(())
    }

    pub fn get_attempts(&self, build_id: &str) -> Vec<BuildAttempt> {
        self.attempts
            .lock()
            .get(build_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_last_attempt(&self, build_id: &str) -> Option<BuildAttempt> {
        self.attempts
            .lock()
            .get(build_id)
            .and_then(|attempts| attempts.last().cloned())
    }

    pub fn clear_attempts(&self, build_id: &str) {
        self.attempts.lock().remove(build_id);
    }

    fn attempt_count(&self, build_id: &str) -> usize {
        self.attempts.lock().get(build_id).map_or(0, Vec::len)
    }

    pub fn backoff_duration(&self) -> Duration {
        self.strategy.backoff
    }

    pub fn max_attempts(&self) -> u32 {
        self.strategy.max_attempts
    }
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new(RetryStrategy::default())
    }
}

impl std::fmt::Debug for RetryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryManager")
            .field("strategy", &self.strategy)
            .field("tracked_jobs", &self.attempts.lock().len())
            .field("has_notification_callback", &self.notification_callback.is_some())
            .finish()
    }
}

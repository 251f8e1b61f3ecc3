//! # System Constants
//!
//! Fixed ceilings and defaults shared by the worker, the retry engine and the
//! recovery service.

use std::time::Duration;

/// Global ceiling on `BuildJob::retry_count`, independent of the retry strategy
pub const MAX_RETRIES: u32 = 2;

/// Hard-coded build timeout used when neither the job, its build config nor
/// the worker configuration supplies one (30 minutes)
pub const DEFAULT_BUILD_TIMEOUT_SECONDS: u64 = 1800;

/// Default number of worker loops draining the queue
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;

/// Sleep between dequeue attempts when the queue is empty
pub const EMPTY_QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Sleep after a dequeue failure that is not "no jobs"
pub const DEQUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Default wait before a retried job is re-enqueued
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Default per-strategy attempt ceiling tracked by the retry manager
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Log entries produced by the build pipeline
pub mod log_tags {
    /// Source tag attached to every streamed build log line
    pub const BUILD_SOURCE: &str = "build";
    /// Level attached to streamed build output
    pub const INFO_LEVEL: &str = "info";
    /// Level attached to validation rejections
    pub const ERROR_LEVEL: &str = "error";
}

/// Build-type identifiers as they appear on the wire and in notifications
pub mod build_types {
    pub const PURE_NIX: &str = "pure-nix";
    pub const OCI: &str = "oci";
}

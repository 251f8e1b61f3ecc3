//! # Retry and Fallback
//!
//! Decides whether a failed build is resubmitted and whether the resubmission
//! switches artifact type from a pure store path to a container image.
//!
//! ## Overview
//!
//! Two independent axes drive the decision:
//!
//! - **retry at all**: transient failures (network, hash mismatch, timeouts)
//!   are retried up to two ceilings, the global `MAX_RETRIES` on the job and
//!   the strategy's `max_attempts` over recorded history;
//! - **retry as OCI**: native-toolchain failures mean the pure build can never
//!   succeed for this tree, so the retry is escalated to a container build and
//!   a [`FallbackNotification`] is emitted.
//!
//! Validation failures are never retried.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use buildkeeper_core::retry::{RetryManager, RetryStrategy};
//! use std::sync::Arc;
//!
//! let manager = RetryManager::new(RetryStrategy::default()).with_notification_callback(
//!     Arc::new(|notification| {
//!         println!("{} falling back to {}", notification.build_id, notification.fallback_type);
//!     }),
//! );
//! assert_eq!(manager.max_attempts(), 2);
//! ```

pub mod classifier;
pub mod manager;

pub use classifier::{ErrorClassification, ErrorPatterns};
pub use manager::{
    BuildAttempt, FallbackNotification, NotificationCallback, RetryError, RetryManager,
    RetryStrategy,
};

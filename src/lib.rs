#![allow(clippy::doc_markdown)] // Allow technical terms like Nix, OCI, Dockerfile in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Buildkeeper Core
//!
//! Build-lifecycle orchestration for a multi-tenant deploy platform.
//!
//! ## Overview
//!
//! A queued "build this commit" request is turned into an artifact: either a
//! content-addressed package-store path (`pure-nix`) or a container image
//! (`oci`). The core chooses among several build strategies, tolerates
//! transient failures through a retry/fallback engine, and reconciles job
//! state after a process restart.
//!
//! ## Architecture
//!
//! ```text
//! Queue ──▶ BuildWorker ──▶ Validator ──▶ enforce strategy build type
//!                │
//!                ▼
//!        queued → running ──▶ BuildDispatcher ──▶ StrategyExecutor | legacy builder
//!                │
//!        failure ├──▶ RetryManager ──▶ running → queued (retry, maybe as OCI)
//!                └──▶ running → failed / succeeded
//! ```
//!
//! The [`orchestration::RecoveryService`] runs once before the worker pool
//! starts draining the queue.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Job status vocabulary and transition rules
//! - [`validation`] - Structural validation of build jobs
//! - [`progress`] - Stage and percentage telemetry
//! - [`executors`] - Strategy executors and artifact-builder contracts
//! - [`registry`] - Strategy → executor dispatch table
//! - [`retry`] - Failure classification and retry/fallback decisions
//! - [`orchestration`] - Worker pool, dispatch and startup recovery
//! - [`store`] / [`queue`] - Persistence and queue contracts
//! - [`config`] - Configuration loading
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use buildkeeper_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//! println!("worker concurrency: {}", config.config().worker.concurrency);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod executors;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod progress;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod state_machine;
pub mod store;
pub mod validation;

pub use config::{BuildkeeperConfig, ConfigManager, RetryConfig, WorkerConfig};
pub use error::{BuildError, Result};
pub use models::{
    BuildConfig, BuildJob, BuildStrategy, BuildType, Deployment, DeploymentStatus,
    DetectionResult, LogEntry,
};
pub use orchestration::{
    BuildCollaborators, BuildWorker, RecoveryReport, RecoveryService, WorkerComponents,
};
pub use state_machine::{can_transition, is_terminal_state, BuildStatus};

//! # Data Models
//!
//! Records the build core reads and writes through the store contracts.
//!
//! - [`BuildJob`] - the unit of work, with its declared [`BuildType`] and [`BuildStrategy`]
//! - [`Deployment`] - the higher-level record a job builds for
//! - [`LogEntry`] - one persisted line of build output

pub mod build_job;
pub mod deployment;
pub mod log_entry;

pub use build_job::{
    enforce_build_type, BuildConfig, BuildJob, BuildStrategy, BuildType, DetectionResult,
};
pub use deployment::{Deployment, DeploymentStatus};
pub use log_entry::LogEntry;

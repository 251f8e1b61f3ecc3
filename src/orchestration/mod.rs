//! # Build Orchestration
//!
//! The worker pool, the per-job dispatch, live log streaming and the startup
//! recovery pass.
//!
//! ## Components
//!
//! - [`BuildWorker`] - dequeue loops and the single-job pipeline
//! - [`BuildDispatcher`] - strategy executor lookup with legacy fallback
//! - [`LogStreamer`] - ordered persistence of builder output
//! - [`RecoveryService`] - reconciliation of jobs left behind by a crash
//! - [`WorkerComponents`] / [`BuildCollaborators`] - worker assembly

pub mod bootstrap;
pub mod dispatcher;
pub mod log_streamer;
pub mod recovery;
pub mod worker;

pub use bootstrap::{default_registry, BuildCollaborators, WorkerComponents};
pub use dispatcher::BuildDispatcher;
pub use log_streamer::LogStreamer;
pub use recovery::{RecoveryIssue, RecoveryPhase, RecoveryReport, RecoveryService};
pub use worker::{effective_timeout, BuildWorker};

//! # Strategy Executors
//!
//! Polymorphic executors that turn a [`BuildJob`] into an artifact for one or
//! more [`BuildStrategy`] values.
//!
//! ## Overview
//!
//! Each executor conceptually:
//!
//! 1. obtains or reuses a detection result,
//! 2. obtains or generates a build descriptor,
//! 3. delegates artifact construction to the pure or OCI [`ArtifactBuilder`],
//!
//! forwarding every line of builder output to a caller-supplied
//! [`LogCallback`]. Executors never mutate the job they are handed. Anything
//! they generate along the way is returned as [`GeneratedInputs`] on both the
//! success and the failure path, and the worker applies it to the canonical
//! record so a retry reuses it.
//!
//! ## Executors
//!
//! - [`FlakeStrategyExecutor`] - repository ships its own flake
//! - [`AutoStrategyExecutor`] - per-language descriptor generation (Go, Node, Rust, Python)
//! - [`DockerfileStrategyExecutor`] - wraps an external Dockerfile, always OCI
//! - [`NixpacksStrategyExecutor`] - buildpack-style build, always OCI

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::BuildError;
use crate::models::{BuildJob, BuildStrategy, DetectionResult};

pub mod auto;
pub mod builders;
pub mod collaborators;
pub mod dockerfile;
pub mod flake;
pub mod nixpacks;

pub use auto::{AutoStrategyExecutor, Language};
pub use builders::{ArtifactBuilder, ArtifactBuilders, ArtifactOutput, BuilderFailure};
pub use collaborators::{CachePusher, Detector, HashCalculator, TemplateData, TemplateEngine};
pub use dockerfile::DockerfileStrategyExecutor;
pub use flake::FlakeStrategyExecutor;
pub use nixpacks::NixpacksStrategyExecutor;

/// Line-oriented sink for builder output
pub type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// A [`LogCallback`] that drops every line
pub fn discard_logs() -> LogCallback {
    Arc::new(|_line: &str| {})
}

/// Inputs an executor produced that are worth caching on the job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedInputs {
    pub detection: Option<DetectionResult>,
    pub generated_flake: Option<String>,
    pub vendor_hash: Option<String>,
}

impl GeneratedInputs {
    pub fn is_empty(&self) -> bool {
        self.detection.is_none() && self.generated_flake.is_none() && self.vendor_hash.is_none()
    }

    /// Copy every produced value onto `job`, leaving the rest untouched
    pub fn apply_to(&self, job: &mut BuildJob) {
        if let Some(detection) = &self.detection {
            job.detection = Some(detection.clone());
        }
        if let Some(flake) = &self.generated_flake {
            job.generated_flake = Some(flake.clone());
        }
        if let Some(hash) = &self.vendor_hash {
            job.vendor_hash = Some(hash.clone());
        }
    }
}

/// Successful strategy execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildResult {
    /// Store path for pure builds, image tag for OCI builds
    pub artifact: String,
    pub store_path: Option<String>,
    pub image_tag: Option<String>,
    pub logs: String,
    pub generated: GeneratedInputs,
}

/// Failed strategy execution, with whatever was logged and generated before
/// the failure
#[derive(Debug, Clone, PartialEq)]
pub struct BuildFailure {
    pub error: BuildError,
    pub logs: String,
    pub generated: GeneratedInputs,
}

impl BuildFailure {
    pub fn new(error: BuildError, logs: String, generated: GeneratedInputs) -> Self {
        Self {
            error,
            logs,
            generated,
        }
    }
}

impl From<BuildError> for BuildFailure {
    fn from(error: BuildError) -> Self {
        Self::new(error, String::new(), GeneratedInputs::default())
    }
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for BuildFailure {}

/// Produces an artifact for the strategies it supports
#[async_trait]
pub trait StrategyExecutor: Send + Sync {
    /// Name used in logs and registry introspection
    fn name(&self) -> &'static str;

    fn supports(&self, strategy: BuildStrategy) -> bool;

    async fn execute(&self, job: &BuildJob, on_line: LogCallback)
        -> Result<BuildResult, BuildFailure>;
}

/// Accumulates every line it sees while forwarding it to an outer callback
#[derive(Clone)]
pub struct LogCollector {
    lines: Arc<Mutex<String>>,
    forward: LogCallback,
}

impl LogCollector {
    pub fn new(forward: LogCallback) -> Self {
        Self {
            lines: Arc::new(Mutex::new(String::new())),
            forward,
        }
    }

    pub fn line(&self, line: &str) {
        {
            let mut lines = self.lines.lock();
            lines.push_str(line);
            lines.push('\n');
        }
        (self.forward)(line);
    }

    /// A callback handing lines to this collector, for passing to builders
    pub fn callback(&self) -> LogCallback {
        let collector = self.clone();
        Arc::new(move |line: &str| collector.line(line))
    }

    pub fn logs(&self) -> String {
        self.lines.lock().clone()
    }

    pub fn fail(&self, error: BuildError, generated: GeneratedInputs) -> BuildFailure {
        BuildFailure::new(error, self.logs(), generated)
    }
}

impl fmt::Debug for LogCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogCollector")
            .field("bytes", &self.lines.lock().len())
            .finish()
    }
}

//! # Auto-Language Strategy Executor
//!
//! Generates a build descriptor for repositories that do not ship one.
//!
//! ## Overview
//!
//! On the first attempt the executor detects the toolchain (or reuses a
//! detection cached on the job), merges the user's build config over the
//! detection's suggested config, computes the dependency vendor hash for
//! languages that need one, and renders the per-language template. The
//! generated descriptor is handed back as [`GeneratedInputs`] so a retry skips
//! straight to the build.
//!
//! | Language | Strategy      | Template                          | Vendor hash |
//! |----------|---------------|-----------------------------------|-------------|
//! | Go       | `auto-go`     | `go.nix`, `go-cgo.nix` with CGO   | yes         |
//! | Node     | `auto-node`   | `nodejs.nix`, `nextjs.nix`        | yes         |
//! | Rust     | `auto-rust`   | `rust.nix`                        | yes         |
//! | Python   | `auto-python` | `python.nix`                      | no          |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    ArtifactBuilders, BuildFailure, BuildResult, Detector, GeneratedInputs, HashCalculator,
    LogCallback, LogCollector, StrategyExecutor, TemplateData, TemplateEngine,
};
use crate::error::BuildError;
use crate::models::{BuildConfig, BuildJob, BuildStrategy, DetectionResult};

/// Languages with descriptor generation support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Go,
    Node,
    Rust,
    Python,
}

impl Language {
    pub fn strategy(&self) -> BuildStrategy {
        match self {
            Self::Go => BuildStrategy::AutoGo,
            Self::Node => BuildStrategy::AutoNode,
            Self::Rust => BuildStrategy::AutoRust,
            Self::Python => BuildStrategy::AutoPython,
        }
    }

    pub fn needs_vendor_hash(&self) -> bool {
        !matches!(self, Self::Python)
    }

    /// Template for this language given the merged config and detection
    pub fn template(&self, config: &BuildConfig, detection: &DetectionResult) -> &'static str {
        match self {
            Self::Go if config.cgo_enabled.unwrap_or(false) => "go-cgo.nix",
            Self::Go => "go.nix",
            Self::Node if detection.framework.eq_ignore_ascii_case("nextjs") => "nextjs.nix",
            Self::Node => "nodejs.nix",
            Self::Rust => "rust.nix",
            Self::Python => "python.nix",
        }
    }

    fn configured_version<'a>(&self, config: &'a BuildConfig) -> Option<&'a str> {
        match self {
            Self::Go => config.go_version.as_deref(),
            Self::Node => config.node_version.as_deref(),
            Self::Python => config.python_version.as_deref(),
            Self::Rust => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Go => "go",
            Self::Node => "node",
            Self::Rust => "rust",
            Self::Python => "python",
        };
        f.write_str(value)
    }
}

pub struct AutoStrategyExecutor {
    language: Language,
    detector: Arc<dyn Detector>,
    templates: Arc<dyn TemplateEngine>,
    hasher: Arc<dyn HashCalculator>,
    builders: ArtifactBuilders,
}

impl AutoStrategyExecutor {
    pub fn new(
        language: Language,
        detector: Arc<dyn Detector>,
        templates: Arc<dyn TemplateEngine>,
        hasher: Arc<dyn HashCalculator>,
        builders: ArtifactBuilders,
    ) -> Self {
        Self {
            language,
            detector,
            templates,
            hasher,
            builders,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Detect, hash and render; fills `generated` as it goes so a failure
    /// part-way still hands back what was produced.
    async fn generate(
        &self,
        job: &BuildJob,
        logs: &LogCollector,
        generated: &mut GeneratedInputs,
    ) -> Result<(), BuildError> {
        logs.line("=== Pre-build phase: Detect ===");
        let detection = match &job.detection {
            Some(detection) => {
                logs.line("Reusing cached detection result");
                detection.clone()
            }
            None => {
                let detection = self
                    .detector
                    .detect(job, self.language)
                    .await
                    .map_err(|err| BuildError::detection(&err))?;
                generated.detection = Some(detection.clone());
                detection
            }
        };

        let user_config = job.build_config.clone().unwrap_or_default();
        let mut config = user_config.merged_over(&detection.suggested_config);
        if config.entry_point.is_none() {
            config.entry_point = detection.entry_points.first().cloned();
        }

        let version = self
            .language
            .configured_version(&config)
            .map(str::to_string)
            .unwrap_or_else(|| detection.version.clone());
        logs.line(&format!("Detected {} version: {}", self.language, version));
        if !detection.entry_points.is_empty() {
            logs.line(&format!("Entry points: {:?}", detection.entry_points));
        }
        if let (Some(user), Some(detected)) =
            (user_config.cgo_enabled, detection.suggested_config.cgo_enabled)
        {
            if user != detected {
                logs.line(&format!(
                    "User CGO setting ({user}) overrides detected setting ({detected})"
                ));
            }
        }

        let vendor_hash = match (&job.vendor_hash, self.language.needs_vendor_hash()) {
            (Some(hash), _) => Some(hash.clone()),
            (None, true) => {
                logs.line("=== Calculating vendor hash ===");
                let hash = self
                    .hasher
                    .vendor_hash(job, self.language)
                    .await
                    .map_err(|err| BuildError::hash_calculation(&err))?;
                logs.line(&format!("Vendor hash: {hash}"));
                generated.vendor_hash = Some(hash.clone());
                Some(hash)
            }
            (None, false) => None,
        };

        let template = self.language.template(&config, &detection);
        logs.line(&format!("=== Generating flake.nix from {template} ==="));
        let data = TemplateData {
            app_name: TemplateData::app_name_for(config.entry_point.as_deref()),
            git_url: job.git_url.clone(),
            git_ref: job.git_ref.clone(),
            version,
            entry_point: config.entry_point.clone(),
            build_command: config.build_command.clone(),
            start_command: config.start_command.clone(),
            vendor_hash,
            config,
            detection: Some(detection),
        };
        let flake = self
            .templates
            .render(template, &data)
            .await
            .map_err(|err| BuildError::template_render(template, &err))?;

        debug!(job_id = %job.id, flake_length = flake.len(), "Generated flake for job");
        logs.line("Generated flake.nix successfully");
        generated.generated_flake = Some(flake);
        Ok(())
    }
}

impl fmt::Debug for AutoStrategyExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoStrategyExecutor")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StrategyExecutor for AutoStrategyExecutor {
    fn name(&self) -> &'static str {
        match self.language {
            Language::Go => "auto-go",
            Language::Node => "auto-node",
            Language::Rust => "auto-rust",
            Language::Python => "auto-python",
        }
    }

    fn supports(&self, strategy: BuildStrategy) -> bool {
        strategy == self.language.strategy()
    }

    async fn execute(
        &self,
        job: &BuildJob,
        on_line: LogCallback,
    ) -> Result<BuildResult, BuildFailure> {
        info!(
            job_id = %job.id,
            language = %self.language,
            build_type = %job.build_type,
            has_generated_flake = job.generated_flake.is_some(),
            "🤖 Executing auto strategy"
        );

        let logs = LogCollector::new(on_line);
        let mut generated = GeneratedInputs::default();

        if job.generated_flake.is_none() {
            if let Err(error) = self.generate(job, &logs, &mut generated).await {
                return Err(logs.fail(error, generated));
            }
        } else {
            logs.line("Reusing generated flake.nix from previous attempt");
        }

        let Some(build_type) = job.build_type() else {
            let error = BuildError::UnknownBuildType {
                build_type: job.build_type.clone(),
            };
            return Err(logs.fail(error, generated));
        };

        let mut working = job.clone();
        generated.apply_to(&mut working);

        match self.builders.build(build_type, &working, &logs.callback()).await {
            Ok(result) => Ok(BuildResult {
                logs: logs.logs(),
                generated,
                ..result
            }),
            Err(error) => Err(logs.fail(error, generated)),
        }
    }
}

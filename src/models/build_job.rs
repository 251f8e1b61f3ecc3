//! # Build Job Model
//!
//! A build job is created by the submission path with status `queued` and is
//! mutated only by the worker and the recovery service. Build type and
//! strategy are carried as the raw submitted strings so the validator can
//! report unknown values; typed accessors parse them on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::build_types;
use crate::state_machine::BuildStatus;

/// Artifact kind produced by a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildType {
    /// Content-addressed package-store path
    #[serde(rename = "pure-nix")]
    PureNix,
    /// Container image
    #[serde(rename = "oci")]
    Oci,
}

impl BuildType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PureNix => build_types::PURE_NIX,
            Self::Oci => build_types::OCI,
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            build_types::PURE_NIX => Ok(Self::PureNix),
            build_types::OCI => Ok(Self::Oci),
            _ => Err(format!("Invalid build type: {s}")),
        }
    }
}

/// Declared method for producing an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildStrategy {
    /// Repository ships its own flake
    Flake,
    AutoGo,
    AutoRust,
    AutoNode,
    AutoPython,
    /// Externally supplied Dockerfile
    Dockerfile,
    /// Generic buildpack-style build
    Nixpacks,
    /// Served by the legacy build-type dispatch
    Auto,
}

impl BuildStrategy {
    pub const ALL: [BuildStrategy; 8] = [
        Self::Flake,
        Self::AutoGo,
        Self::AutoRust,
        Self::AutoNode,
        Self::AutoPython,
        Self::Dockerfile,
        Self::Nixpacks,
        Self::Auto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flake => "flake",
            Self::AutoGo => "auto-go",
            Self::AutoRust => "auto-rust",
            Self::AutoNode => "auto-node",
            Self::AutoPython => "auto-python",
            Self::Dockerfile => "dockerfile",
            Self::Nixpacks => "nixpacks",
            Self::Auto => "auto",
        }
    }

    /// Strategies whose artifact type is always a container image
    pub fn is_oci_only(&self) -> bool {
        matches!(self, Self::Dockerfile | Self::Nixpacks)
    }
}

impl fmt::Display for BuildStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| format!("Invalid build strategy: {s}"))
    }
}

/// Returns the build type a strategy actually runs with and whether the
/// requested type had to be overridden.
pub fn enforce_build_type(strategy: BuildStrategy, requested: BuildType) -> (BuildType, bool) {
    if strategy.is_oci_only() && requested != BuildType::Oci {
        (BuildType::Oci, true)
    } else {
        (requested, false)
    }
}

/// User-supplied build configuration embedded in a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment_vars: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub go_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cgo_enabled: Option<bool>,
    /// Build timeout in seconds, zero means unset
    #[serde(default)]
    pub build_timeout: i64,
}

impl BuildConfig {
    /// Overlay `self` (user config) on top of `detected`; user values win
    /// field by field.
    pub fn merged_over(&self, detected: &BuildConfig) -> BuildConfig {
        let mut environment_vars = detected.environment_vars.clone();
        environment_vars.extend(self.environment_vars.clone());

        BuildConfig {
            build_command: self.build_command.clone().or_else(|| detected.build_command.clone()),
            start_command: self.start_command.clone().or_else(|| detected.start_command.clone()),
            entry_point: self.entry_point.clone().or_else(|| detected.entry_point.clone()),
            environment_vars,
            go_version: self.go_version.clone().or_else(|| detected.go_version.clone()),
            node_version: self.node_version.clone().or_else(|| detected.node_version.clone()),
            python_version: self
                .python_version
                .clone()
                .or_else(|| detected.python_version.clone()),
            package_manager: self
                .package_manager
                .clone()
                .or_else(|| detected.package_manager.clone()),
            cgo_enabled: self.cgo_enabled.or(detected.cgo_enabled),
            build_timeout: if self.build_timeout > 0 {
                self.build_timeout
            } else {
                detected.build_timeout
            },
        }
    }
}

/// Language/framework detection metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub strategy: Option<BuildStrategy>,
    #[serde(default)]
    pub framework: String,
    /// Detected language toolchain version
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub entry_points: Vec<String>,
    #[serde(default)]
    pub suggested_config: BuildConfig,
    pub recommended_build_type: Option<BuildType>,
    #[serde(default)]
    pub confidence: f64,
}

/// Build job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildJob {
    pub id: String,
    pub deployment_id: String,
    pub app_id: String,
    pub git_url: String,
    pub git_ref: String,
    #[serde(default)]
    pub flake_output: String,
    /// Raw build type as submitted, see [`BuildJob::build_type`]
    pub build_type: String,
    /// Raw strategy as submitted; empty selects the legacy dispatch
    #[serde(default)]
    pub build_strategy: String,
    pub status: BuildStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub retry_as_oci: bool,
    /// Per-job timeout override in seconds, zero means unset
    #[serde(default)]
    pub timeout_seconds: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_config: Option<BuildConfig>,
    /// Build descriptor generated on first dispatch, reused on retry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_flake: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Pre-staged local checkout, avoids re-cloning within one attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

impl BuildJob {
    /// Create a queued job as the submission path would
    pub fn new(
        id: impl Into<String>,
        deployment_id: impl Into<String>,
        app_id: impl Into<String>,
        build_type: BuildType,
    ) -> Self {
        Self {
            id: id.into(),
            deployment_id: deployment_id.into(),
            app_id: app_id.into(),
            git_url: String::new(),
            git_ref: String::new(),
            flake_output: String::new(),
            build_type: build_type.as_str().to_string(),
            build_strategy: String::new(),
            status: BuildStatus::Queued,
            retry_count: 0,
            retry_as_oci: false,
            timeout_seconds: 0,
            build_config: None,
            generated_flake: None,
            detection: None,
            vendor_hash: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            source_path: None,
        }
    }

    pub fn with_strategy(mut self, strategy: BuildStrategy) -> Self {
        self.build_strategy = strategy.as_str().to_string();
        self
    }

    pub fn with_source(mut self, git_url: impl Into<String>, git_ref: impl Into<String>) -> Self {
        self.git_url = git_url.into();
        self.git_ref = git_ref.into();
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: i64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_build_config(mut self, config: BuildConfig) -> Self {
        self.build_config = Some(config);
        self
    }

    /// Parsed build type, `None` when the raw value is unknown
    pub fn build_type(&self) -> Option<BuildType> {
        self.build_type.parse().ok()
    }

    pub fn set_build_type(&mut self, build_type: BuildType) {
        self.build_type = build_type.as_str().to_string();
    }

    /// Parsed strategy, `None` when unset or unknown
    pub fn strategy(&self) -> Option<BuildStrategy> {
        self.build_strategy.parse().ok()
    }

    pub fn is_oci(&self) -> bool {
        self.build_type() == Some(BuildType::Oci)
    }
}

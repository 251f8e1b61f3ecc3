//! Build job validation
//!
//! Structural checks run on the canonical job record before anything is
//! executed. Every check is evaluated so a single call reports every problem.
//! An invalid job produces `Ok(ValidationResult { valid: false, .. })`; the
//! `Err` side is reserved for failures of the validator itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::models::{BuildConfig, BuildJob, BuildStrategy, BuildType};

const SUPPORTED_PACKAGE_MANAGERS: [&str; 3] = ["npm", "yarn", "pnpm"];

/// Machine-readable validation failure code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    RequiredField,
    InvalidValue,
    NegativeValue,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequiredField => "REQUIRED_FIELD",
            Self::InvalidValue => "INVALID_VALUE",
            Self::NegativeValue => "NEGATIVE_VALUE",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field-level validation error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub code: ValidationCode,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: ValidationCode) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (code: {})", self.field, self.message, self.code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationIssue>,
    /// Advisory only, never affects `valid`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn from_parts(errors: Vec<ValidationIssue>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn has_error_on(&self, field: &str) -> bool {
        self.errors.iter().any(|issue| issue.field == field)
    }
}

/// Checks a build job before execution
#[async_trait]
pub trait BuildValidator: Send + Sync {
    async fn validate(&self, job: &BuildJob) -> Result<ValidationResult>;
}

#[derive(Debug, Clone, Default)]
pub struct DefaultBuildValidator;

impl DefaultBuildValidator {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous form of [`BuildValidator::validate`]
    pub fn check(&self, job: &BuildJob) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if job.id.is_empty() {
            errors.push(ValidationIssue::new(
                "id",
                "build job ID is required",
                ValidationCode::RequiredField,
            ));
        }

        if job.deployment_id.is_empty() {
            errors.push(ValidationIssue::new(
                "deployment_id",
                "deployment ID is required",
                ValidationCode::RequiredField,
            ));
        }

        if job.build_type.is_empty() {
            errors.push(ValidationIssue::new(
                "build_type",
                "build type is required",
                ValidationCode::RequiredField,
            ));
        } else if job.build_type().is_none() {
            errors.push(ValidationIssue::new(
                "build_type",
                format!("invalid build type: {}", job.build_type),
                ValidationCode::InvalidValue,
            ));
        }

        if !job.build_strategy.is_empty() {
            match job.build_strategy.parse::<BuildStrategy>() {
                Ok(strategy) => {
                    if strategy.is_oci_only() && job.build_type() != Some(BuildType::Oci) {
                        warnings.push(format!(
                            "strategy {strategy} requires OCI build type, will be enforced"
                        ));
                    }
                }
                Err(_) => errors.push(ValidationIssue::new(
                    "build_strategy",
                    format!("invalid build strategy: {}", job.build_strategy),
                    ValidationCode::InvalidValue,
                )),
            }
        }

        if let Some(config) = &job.build_config {
            check_build_config(config, &mut errors, &mut warnings);
        }

        if job.timeout_seconds < 0 {
            errors.push(ValidationIssue::new(
                "timeout_seconds",
                "timeout cannot be negative",
                ValidationCode::NegativeValue,
            ));
        }

        ValidationResult::from_parts(errors, warnings)
    }
}

#[async_trait]
impl BuildValidator for DefaultBuildValidator {
    async fn validate(&self, job: &BuildJob) -> Result<ValidationResult> {
        Ok(self.check(job))
    }
}

fn check_build_config(
    config: &BuildConfig,
    errors: &mut Vec<ValidationIssue>,
    warnings: &mut Vec<String>,
) {
    let versions = [
        ("Go", &config.go_version),
        ("Node", &config.node_version),
        ("Python", &config.python_version),
    ];
    for (language, version) in versions {
        if let Some(version) = version.as_deref().filter(|v| !v.is_empty()) {
            if !is_valid_version_format(version) {
                warnings.push(format!(
                    "{language} version '{version}' may not be a valid version format"
                ));
            }
        }
    }

    if let Some(manager) = config.package_manager.as_deref().filter(|m| !m.is_empty()) {
        if !SUPPORTED_PACKAGE_MANAGERS.contains(&manager) {
            warnings.push(format!("package manager '{manager}' may not be supported"));
        }
    }

    if config.build_timeout < 0 {
        errors.push(ValidationIssue::new(
            "build_config.build_timeout",
            "build timeout cannot be negative",
            ValidationCode::NegativeValue,
        ));
    }
}

/// Version strings start with a digit or `v`
fn is_valid_version_format(version: &str) -> bool {
    version
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_digit() || first == 'v')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_job() -> BuildJob {
        BuildJob::new("job-1", "dep-1", "app-1", BuildType::PureNix)
            .with_strategy(BuildStrategy::AutoGo)
    }

    #[tokio::test]
    async fn test_valid_job_passes() {
        let result = DefaultBuildValidator::new().validate(&valid_job()).await.unwrap();
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_async_validate_agrees_with_check() {
        let validator = DefaultBuildValidator::new();
        let job = valid_job().with_strategy(BuildStrategy::Nixpacks);

        let result = tokio_test::block_on(validator.validate(&job)).unwrap();
        assert_eq!(result, validator.check(&job));
    }

    #[test]
    fn test_reports_every_problem_at_once() {
        let mut job = valid_job();
        job.id.clear();
        job.deployment_id.clear();
        job.build_type = "docker".to_string();
        job.build_strategy = "magic".to_string();
        job.timeout_seconds = -5;

        let result = DefaultBuildValidator::new().check(&job);
        assert!(!result.valid);
        let fields: Vec<_> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["id", "deployment_id", "build_type", "build_strategy", "timeout_seconds"]
        );
        assert_eq!(result.errors[0].code, ValidationCode::RequiredField);
        assert_eq!(result.errors[2].code, ValidationCode::InvalidValue);
        assert_eq!(result.errors[4].code, ValidationCode::NegativeValue);
    }

    #[test]
    fn test_missing_build_type_is_required_field() {
        let mut job = valid_job();
        job.build_type.clear();
        let result = DefaultBuildValidator::new().check(&job);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, ValidationCode::RequiredField);
    }

    #[test]
    fn test_oci_only_strategy_warns_without_failing() {
        let job = BuildJob::new("job-1", "dep-1", "app-1", BuildType::PureNix)
            .with_strategy(BuildStrategy::Dockerfile);
        let result = DefaultBuildValidator::new().check(&job);
        assert!(result.valid);
        assert_eq!(
            result.warnings,
            vec!["strategy dockerfile requires OCI build type, will be enforced".to_string()]
        );
    }

    #[test]
    fn test_build_config_checks() {
        let job = valid_job().with_build_config(BuildConfig {
            go_version: Some("latest".to_string()),
            node_version: Some("v20".to_string()),
            package_manager: Some("bun".to_string()),
            build_timeout: -1,
            ..Default::default()
        });

        let result = DefaultBuildValidator::new().check(&job);
        assert!(!result.valid);
        assert!(result.has_error_on("build_config.build_timeout"));
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings[0].contains("Go version 'latest'"));
        assert!(result.warnings[1].contains("package manager 'bun'"));
    }

    #[test]
    fn test_issue_display_includes_code() {
        let issue = ValidationIssue::new("id", "build job ID is required", ValidationCode::RequiredField);
        assert_eq!(issue.to_string(), "id: build job ID is required (code: REQUIRED_FIELD)");
    }
}

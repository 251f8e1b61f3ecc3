//! # Build Failure Classification
//!
//! Typed categories decide first: a [`BuildError::Validation`] is always a
//! validation failure and a [`BuildError::Timeout`] is always transient.
//! Substring matching (case-insensitive) is only applied to text that came
//! from outside the crate, see [`BuildError::external_text`]. Store, queue,
//! registry and state-machine errors are never retryable build failures.
//!
//! The pattern tables are plain configuration and can be replaced through
//! [`crate::config::RetryConfig`].

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Substring tables used to classify uncontrolled error text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorPatterns {
    /// Transient failures worth retrying as-is
    pub retryable: Vec<String>,
    /// Native-toolchain failures that send a pure build to OCI
    pub oci_fallback: Vec<String>,
    /// Phrasing that marks a deterministic validation failure
    pub validation: Vec<String>,
}

impl Default for ErrorPatterns {
    fn default() -> Self {
        Self {
            retryable: to_owned(&[
                "hash mismatch",
                "dependency resolution failed",
                "network error",
                "timeout",
                "connection refused",
                "unable to fetch",
                "failed to download",
            ]),
            oci_fallback: to_owned(&[
                "native dependency",
                "unsupported platform",
                "binary not found",
                "linking failed",
                "undefined reference",
                "cannot find -l",
                "pkg-config",
                "cmake",
                "autoconf",
            ]),
            validation: to_owned(&["validation failed", "validation error"]),
        }
    }
}

fn to_owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| (*p).to_string()).collect()
}

fn contains_any(text: &str, patterns: &[String]) -> bool {
    let text = text.to_lowercase();
    patterns
        .iter()
        .any(|pattern| text.contains(&pattern.to_lowercase()))
}

/// The three independent verdicts for one error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorClassification {
    pub is_validation: bool,
    pub is_retryable: bool,
    pub is_oci_fallback: bool,
}

impl ErrorPatterns {
    pub fn classify(&self, err: &BuildError) -> ErrorClassification {
        ErrorClassification {
            is_validation: self.is_validation_error(err),
            is_retryable: self.is_retryable_error(err),
            is_oci_fallback: self.is_oci_fallback_error(err),
        }
    }

    pub fn is_validation_error(&self, err: &BuildError) -> bool {
        match err {
            BuildError::Validation { .. } => true,
            other => other
                .external_text()
                .is_some_and(|text| self.matches_validation(text)),
        }
    }

    pub fn is_retryable_error(&self, err: &BuildError) -> bool {
        match err {
            BuildError::Timeout { .. } => true,
            BuildError::Validation { .. } => false,
            other => other
                .external_text()
                .is_some_and(|text| self.matches_retryable(text)),
        }
    }

    pub fn is_oci_fallback_error(&self, err: &BuildError) -> bool {
        err.external_text()
            .is_some_and(|text| self.matches_oci_fallback(text))
    }

    pub fn matches_validation(&self, text: &str) -> bool {
        contains_any(text, &self.validation)
    }

    pub fn matches_retryable(&self, text: &str) -> bool {
        contains_any(text, &self.retryable)
    }

    pub fn matches_oci_fallback(&self, text: &str) -> bool {
        contains_any(text, &self.oci_fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{BuildStatus, StateMachineError};
    use crate::validation::{ValidationCode, ValidationIssue};
    use std::time::Duration;

    fn failed(message: &str) -> BuildError {
        BuildError::build_failed(message)
    }

    #[test]
    fn test_typed_categories_win() {
        let patterns = ErrorPatterns::default();

        let validation = BuildError::Validation {
            issues: vec![ValidationIssue::new("id", "required", ValidationCode::RequiredField)],
        };
        let classification = patterns.classify(&validation);
        assert!(classification.is_validation);
        assert!(!classification.is_retryable);

        let timeout = BuildError::Timeout {
            timeout: Duration::from_secs(1),
        };
        assert!(patterns.is_retryable_error(&timeout));
        assert!(!patterns.is_oci_fallback_error(&timeout));
    }

    #[test]
    fn test_external_text_matching_is_case_insensitive() {
        let patterns = ErrorPatterns::default();
        assert!(patterns.is_retryable_error(&failed("Hash Mismatch in fixed-output derivation")));
        assert!(patterns.is_retryable_error(&failed("dial tcp: connection refused")));
        assert!(patterns.is_oci_fallback_error(&failed("native dependency not found")));
        assert!(patterns.is_oci_fallback_error(&failed("ld: cannot find -lssl")));
        assert!(patterns.is_validation_error(&failed("schema validation failed")));
        assert!(!patterns.is_retryable_error(&failed("syntax error in main.go")));
    }

    #[test]
    fn test_infrastructure_errors_are_never_retryable() {
        let patterns = ErrorPatterns::default();
        let err = BuildError::StateMachine(StateMachineError::InvalidTransition {
            job_id: "network error timeout".to_string(),
            from: BuildStatus::Failed,
            to: BuildStatus::Running,
            is_retry: false,
        });
        assert_eq!(patterns.classify(&err), ErrorClassification::default());
    }

    #[test]
    fn test_patterns_are_injectable() {
        let patterns = ErrorPatterns {
            retryable: vec!["flaky".to_string()],
            oci_fallback: vec![],
            validation: vec![],
        };
        assert!(patterns.is_retryable_error(&failed("FLAKY registry")));
        assert!(!patterns.is_retryable_error(&failed("network error")));
        assert!(!patterns.is_oci_fallback_error(&failed("cmake not found")));
    }

    #[test]
    fn test_partial_patterns_deserialize_with_defaults() {
        let patterns: ErrorPatterns =
            serde_json::from_str(r#"{"retryable": ["rate limited"]}"#).unwrap();
        assert_eq!(patterns.retryable, vec!["rate limited".to_string()]);
        assert_eq!(patterns.oci_fallback, ErrorPatterns::default().oci_fallback);
    }
}

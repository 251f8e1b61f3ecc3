//! # Build Error Types
//!
//! Structured error taxonomy for the build pipeline using thiserror.
//!
//! Errors raised inside this crate carry a typed category so the retry engine
//! can classify them without looking at message text. Text matching is kept
//! for failures whose message comes from outside the crate (builder process
//! output, collaborator errors), see [`crate::retry::ErrorPatterns`].

use std::time::Duration;
use thiserror::Error;

use crate::queue::QueueError;
use crate::registry::RegistryError;
use crate::retry::RetryError;
use crate::state_machine::StateMachineError;
use crate::store::StoreError;
use crate::validation::ValidationIssue;

/// Comprehensive build pipeline error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("validation failed: {}", format_issues(.issues))]
    Validation { issues: Vec<ValidationIssue> },

    #[error("build timeout: exceeded {} seconds", .timeout.as_secs())]
    Timeout { timeout: Duration },

    #[error("build failed: {message}")]
    BuildFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("detection failed: {message}")]
    Detection { message: String },

    #[error("template render failed: {template}: {message}")]
    TemplateRender { template: String, message: String },

    #[error("hash calculation failed: {message}")]
    HashCalculation { message: String },

    #[error("cache push failed: {message}")]
    CachePush { message: String },

    #[error("unknown build type: {build_type}")]
    UnknownBuildType { build_type: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Retry(#[from] RetryError),

    #[error("internal error: {message}")]
    Internal { message: String },
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("{}: {}", issue.field, issue.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl BuildError {
    pub fn build_failed(message: impl Into<String>) -> Self {
        Self::BuildFailed {
            message: message.into(),
            exit_code: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wrap a collaborator failure (detector, template engine, hasher, cache
    /// pusher) keeping the full context chain in the message
    pub fn detection(err: &anyhow::Error) -> Self {
        Self::Detection {
            message: format!("{err:#}"),
        }
    }

    pub fn hash_calculation(err: &anyhow::Error) -> Self {
        Self::HashCalculation {
            message: format!("{err:#}"),
        }
    }

    pub fn cache_push(err: &anyhow::Error) -> Self {
        Self::CachePush {
            message: format!("{err:#}"),
        }
    }

    pub fn template_render(template: &str, err: &anyhow::Error) -> Self {
        Self::TemplateRender {
            template: template.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Message text that originated outside this crate, the only text the
    /// pattern classifiers look at
    pub fn external_text(&self) -> Option<&str> {
        match self {
            Self::BuildFailed { message, .. }
            | Self::Detection { message }
            | Self::TemplateRender { message, .. }
            | Self::HashCalculation { message }
            | Self::CachePush { message } => Some(message),
            _ => None,
        }
    }

    /// Whether a failure of this kind should still acknowledge the queue
    /// delivery. Validation rejections and forbidden transitions are
    /// permanent: redelivering them only repeats the failure.
    pub fn acks_delivery(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::StateMachine(_))
    }
}

/// Result type for build pipeline operations
pub type Result<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationCode;

    #[test]
    fn test_validation_error_lists_every_field() {
        let err = BuildError::Validation {
            issues: vec![
                ValidationIssue::new("id", "build job ID is required", ValidationCode::RequiredField),
                ValidationIssue::new(
                    "timeout_seconds",
                    "timeout cannot be negative",
                    ValidationCode::NegativeValue,
                ),
            ],
        };

        let message = err.to_string();
        assert!(message.starts_with("validation failed"));
        assert!(message.contains("id: build job ID is required"));
        assert!(message.contains("timeout_seconds: timeout cannot be negative"));
        assert!(err.acks_delivery());
    }

    #[test]
    fn test_timeout_message_mentions_timeout() {
        let err = BuildError::Timeout {
            timeout: Duration::from_secs(90),
        };
        assert_eq!(err.to_string(), "build timeout: exceeded 90 seconds");
        assert!(err.is_timeout());
        assert!(!err.acks_delivery());
    }

    #[test]
    fn test_collaborator_errors_keep_context_chain() {
        let source = anyhow::anyhow!("connection refused").context("fetching go modules");
        let err = BuildError::hash_calculation(&source);
        assert_eq!(
            err.to_string(),
            "hash calculation failed: fetching go modules: connection refused"
        );
    }
}

//! Narrow contracts for the collaborators strategy executors consume.
//!
//! These wrap uncontrolled tooling (file probing, template rendering, hash
//! prefetching, cache uploads), so they report failures as `anyhow::Error`
//! and the executors map them into typed [`crate::error::BuildError`]s.

use async_trait::async_trait;
use serde::Serialize;

use super::auto::Language;
use crate::models::{BuildConfig, BuildJob, DetectionResult};

/// Detects language, framework and entry points for a job's source tree
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, job: &BuildJob, language: Language) -> anyhow::Result<DetectionResult>;
}

/// Renders a named build descriptor template
#[async_trait]
pub trait TemplateEngine: Send + Sync {
    async fn render(&self, template: &str, data: &TemplateData) -> anyhow::Result<String>;
}

/// Computes the reproducibility hash of a job's dependency lock file
#[async_trait]
pub trait HashCalculator: Send + Sync {
    async fn vendor_hash(&self, job: &BuildJob, language: Language) -> anyhow::Result<String>;
}

/// Uploads a built store-path closure to the binary cache
#[async_trait]
pub trait CachePusher: Send + Sync {
    async fn push_closure(&self, store_path: &str) -> anyhow::Result<()>;
}

/// Values available to descriptor templates
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplateData {
    pub app_name: String,
    pub git_url: String,
    pub git_ref: String,
    /// Language toolchain version
    pub version: String,
    pub entry_point: Option<String>,
    pub build_command: Option<String>,
    pub start_command: Option<String>,
    pub vendor_hash: Option<String>,
    pub config: BuildConfig,
    pub detection: Option<DetectionResult>,
}

impl TemplateData {
    /// App name from the first entry point's final path segment, else "app"
    pub fn app_name_for(entry_point: Option<&str>) -> String {
        entry_point
            .and_then(|entry| entry.trim_end_matches('/').rsplit('/').next())
            .filter(|name| !name.is_empty() && *name != ".")
            .unwrap_or("app")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_name_from_entry_point() {
        assert_eq!(TemplateData::app_name_for(Some("cmd/server")), "server");
        assert_eq!(TemplateData::app_name_for(Some("cmd/api/")), "api");
        assert_eq!(TemplateData::app_name_for(Some(".")), "app");
        assert_eq!(TemplateData::app_name_for(None), "app");
    }
}

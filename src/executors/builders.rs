//! Artifact builder contracts.
//!
//! The builders themselves (Nix evaluation, container assembly) live outside
//! this crate. A builder must forward each line of subprocess output to the
//! callback as it is produced, and should tie the subprocess lifetime to the
//! returned future (kill-on-drop) so an aborted build task releases it.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::{BuildResult, LogCallback};
use crate::error::BuildError;
use crate::models::{BuildJob, BuildType};

/// Output of a single builder invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactOutput {
    pub store_path: Option<String>,
    pub image_tag: Option<String>,
    pub logs: String,
    pub exit_code: i32,
}

/// A builder run that did not produce an artifact
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BuilderFailure {
    pub message: String,
    pub logs: String,
    pub exit_code: Option<i32>,
}

impl BuilderFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            logs: String::new(),
            exit_code: None,
        }
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }
}

impl From<BuilderFailure> for BuildError {
    fn from(failure: BuilderFailure) -> Self {
        BuildError::BuildFailed {
            message: failure.message,
            exit_code: failure.exit_code,
        }
    }
}

#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    async fn build_with_log_callback(
        &self,
        job: &BuildJob,
        on_line: &LogCallback,
    ) -> Result<ArtifactOutput, BuilderFailure>;
}

/// The pure and OCI builders, selected by build type
#[derive(Clone)]
pub struct ArtifactBuilders {
    pure: Arc<dyn ArtifactBuilder>,
    oci: Arc<dyn ArtifactBuilder>,
}

impl ArtifactBuilders {
    pub fn new(pure: Arc<dyn ArtifactBuilder>, oci: Arc<dyn ArtifactBuilder>) -> Self {
        Self { pure, oci }
    }

    /// Build `job` as `build_type`. The result carries the artifact fields
    /// only; callers fill in logs and generated inputs.
    pub async fn build(
        &self,
        build_type: BuildType,
        job: &BuildJob,
        on_line: &LogCallback,
    ) -> Result<BuildResult, BuildError> {
        debug!(job_id = %job.id, build_type = %build_type, "🔨 Invoking artifact builder");

        match build_type {
            BuildType::PureNix => {
                let output = self.pure.build_with_log_callback(job, on_line).await?;
                let store_path = output.store_path.ok_or_else(|| BuildError::BuildFailed {
                    message: "builder returned no store path".to_string(),
                    exit_code: Some(output.exit_code),
                })?;
                Ok(BuildResult {
                    artifact: store_path.clone(),
                    store_path: Some(store_path),
                    ..Default::default()
                })
            }
            BuildType::Oci => {
                let output = self.oci.build_with_log_callback(job, on_line).await?;
                let image_tag = output.image_tag.ok_or_else(|| BuildError::BuildFailed {
                    message: "builder returned no image tag".to_string(),
                    exit_code: Some(output.exit_code),
                })?;
                Ok(BuildResult {
                    artifact: image_tag.clone(),
                    store_path: output.store_path,
                    image_tag: Some(image_tag),
                    ..Default::default()
                })
            }
        }
    }
}

impl std::fmt::Debug for ArtifactBuilders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactBuilders").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::discard_logs;

    struct FixedBuilder(Result<ArtifactOutput, BuilderFailure>);

    #[async_trait]
    impl ArtifactBuilder for FixedBuilder {
        async fn build_with_log_callback(
            &self,
            _job: &BuildJob,
            on_line: &LogCallback,
        ) -> Result<ArtifactOutput, BuilderFailure> {
            on_line("building");
            self.0.clone()
        }
    }

    fn job() -> BuildJob {
        BuildJob::new("job-1", "dep-1", "app-1", BuildType::PureNix)
    }

    #[tokio::test]
    async fn test_pure_build_uses_store_path_as_artifact() {
        let builders = ArtifactBuilders::new(
            Arc::new(FixedBuilder(Ok(ArtifactOutput {
                store_path: Some("/nix/store/abc-app".to_string()),
                ..Default::default()
            }))),
            Arc::new(FixedBuilder(Err(BuilderFailure::new("unused")))),
        );

        let result = builders
            .build(BuildType::PureNix, &job(), &discard_logs())
            .await
            .unwrap();
        assert_eq!(result.artifact, "/nix/store/abc-app");
        assert!(result.image_tag.is_none());
    }

    #[tokio::test]
    async fn test_builder_failure_becomes_build_failed() {
        let builders = ArtifactBuilders::new(
            Arc::new(FixedBuilder(Err(BuilderFailure::new("unused")))),
            Arc::new(FixedBuilder(Err(
                BuilderFailure::new("linking failed: cannot find -lssl").with_exit_code(1),
            ))),
        );

        let err = builders
            .build(BuildType::Oci, &job(), &discard_logs())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::BuildFailed {
                message: "linking failed: cannot find -lssl".to_string(),
                exit_code: Some(1),
            }
        );
    }
}

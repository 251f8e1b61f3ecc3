use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    ArtifactBuilders, BuildFailure, BuildResult, GeneratedInputs, LogCallback, LogCollector,
    StrategyExecutor, TemplateData, TemplateEngine,
};
use crate::error::BuildError;
use crate::models::{BuildJob, BuildStrategy, BuildType, DetectionResult};

const WRAPPER_TEMPLATE: &str = "dockerfile.nix";

/// Wraps a repository Dockerfile in a generated flake and builds an image.
/// Always OCI, whatever build type was requested.
pub struct DockerfileStrategyExecutor {
    templates: Arc<dyn TemplateEngine>,
    builders: ArtifactBuilders,
}

impl DockerfileStrategyExecutor {
    pub fn new(templates: Arc<dyn TemplateEngine>, builders: ArtifactBuilders) -> Self {
        Self {
            templates,
            builders,
        }
    }

    async fn render_wrapper(&self, job: &BuildJob) -> Result<String, BuildError> {
        let config = job.build_config.clone().unwrap_or_default();
        let detection = DetectionResult {
            strategy: Some(BuildStrategy::Dockerfile),
            framework: "generic".to_string(),
            recommended_build_type: Some(BuildType::Oci),
            ..Default::default()
        };
        let data = TemplateData {
            app_name: "app".to_string(),
            git_url: job.git_url.clone(),
            git_ref: job.git_ref.clone(),
            start_command: config.start_command.clone(),
            config,
            detection: Some(detection),
            ..Default::default()
        };

        self.templates
            .render(WRAPPER_TEMPLATE, &data)
            .await
            .map_err(|err| BuildError::template_render(WRAPPER_TEMPLATE, &err))
    }
}

#[async_trait]
impl StrategyExecutor for DockerfileStrategyExecutor {
    fn name(&self) -> &'static str {
        "dockerfile"
    }

    fn supports(&self, strategy: BuildStrategy) -> bool {
        strategy == BuildStrategy::Dockerfile
    }

    async fn execute(
        &self,
        job: &BuildJob,
        on_line: LogCallback,
    ) -> Result<BuildResult, BuildFailure> {
        info!(job_id = %job.id, "🐳 Executing dockerfile strategy");

        let mut working = job.clone();
        if !working.is_oci() {
            warn!(
                job_id = %job.id,
                original_build_type = %job.build_type,
                "dockerfile strategy requires OCI build type, overriding"
            );
            working.set_build_type(BuildType::Oci);
        }

        let logs = LogCollector::new(on_line);
        logs.line("=== Building from Dockerfile ===");
        logs.line("Build type: OCI (enforced for dockerfile strategy)");

        let mut generated = GeneratedInputs::default();
        if working.generated_flake.is_none() {
            logs.line("=== Generating flake.nix wrapper ===");
            match self.render_wrapper(&working).await {
                Ok(flake) => {
                    logs.line("Generated flake.nix wrapper successfully");
                    generated.generated_flake = Some(flake);
                }
                Err(error) => return Err(logs.fail(error, generated)),
            }
        }
        generated.apply_to(&mut working);

        match self
            .builders
            .build(BuildType::Oci, &working, &logs.callback())
            .await
        {
            Ok(result) => Ok(BuildResult {
                logs: logs.logs(),
                generated,
                ..result
            }),
            Err(error) => Err(logs.fail(error, generated)),
        }
    }
}

impl std::fmt::Debug for DockerfileStrategyExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerfileStrategyExecutor").finish_non_exhaustive()
    }
}

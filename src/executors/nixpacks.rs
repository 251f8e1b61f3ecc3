use async_trait::async_trait;
use tracing::{info, warn};

use super::{ArtifactBuilders, BuildFailure, BuildResult, LogCallback, LogCollector, StrategyExecutor};
use crate::models::{BuildJob, BuildStrategy, BuildType};

/// Buildpack-style builds. The OCI builder plans and builds the image from
/// the job's build/start commands; no descriptor is generated here.
#[derive(Debug, Clone)]
pub struct NixpacksStrategyExecutor {
    builders: ArtifactBuilders,
}

impl NixpacksStrategyExecutor {
    pub fn new(builders: ArtifactBuilders) -> Self {
        Self { builders }
    }
}

#[async_trait]
impl StrategyExecutor for NixpacksStrategyExecutor {
    fn name(&self) -> &'static str {
        "nixpacks"
    }

    fn supports(&self, strategy: BuildStrategy) -> bool {
        strategy == BuildStrategy::Nixpacks
    }

    async fn execute(
        &self,
        job: &BuildJob,
        on_line: LogCallback,
    ) -> Result<BuildResult, BuildFailure> {
        info!(job_id = %job.id, "📦 Executing nixpacks strategy");

        let mut working = job.clone();
        if !working.is_oci() {
            warn!(
                job_id = %job.id,
                original_build_type = %job.build_type,
                "nixpacks strategy requires OCI build type, overriding"
            );
            working.set_build_type(BuildType::Oci);
        }

        let logs = LogCollector::new(on_line);
        logs.line("=== Building with Nixpacks ===");
        logs.line("Build type: OCI (enforced for nixpacks strategy)");
        if let Some(config) = &working.build_config {
            if let Some(build_command) = &config.build_command {
                logs.line(&format!("Build command: {build_command}"));
            }
            if let Some(start_command) = &config.start_command {
                logs.line(&format!("Start command: {start_command}"));
            }
        }

        match self
            .builders
            .build(BuildType::Oci, &working, &logs.callback())
            .await
        {
            Ok(result) => {
                logs.line(&format!("Successfully built image: {}", result.artifact));
                Ok(BuildResult {
                    logs: logs.logs(),
                    ..result
                })
            }
            Err(error) => Err(logs.fail(error, Default::default())),
        }
    }
}

use async_trait::async_trait;
use tracing::info;

use super::{ArtifactBuilders, BuildFailure, BuildResult, LogCallback, LogCollector, StrategyExecutor};
use crate::error::BuildError;
use crate::models::{BuildJob, BuildStrategy};

/// Builds repositories that ship their own flake; nothing is generated
#[derive(Debug, Clone)]
pub struct FlakeStrategyExecutor {
    builders: ArtifactBuilders,
}

impl FlakeStrategyExecutor {
    pub fn new(builders: ArtifactBuilders) -> Self {
        Self { builders }
    }
}

#[async_trait]
impl StrategyExecutor for FlakeStrategyExecutor {
    fn name(&self) -> &'static str {
        "flake"
    }

    fn supports(&self, strategy: BuildStrategy) -> bool {
        strategy == BuildStrategy::Flake
    }

    async fn execute(
        &self,
        job: &BuildJob,
        on_line: LogCallback,
    ) -> Result<BuildResult, BuildFailure> {
        info!(job_id = %job.id, build_type = %job.build_type, "❄️ Executing flake strategy");

        let logs = LogCollector::new(on_line);
        let Some(build_type) = job.build_type() else {
            let error = BuildError::UnknownBuildType {
                build_type: job.build_type.clone(),
            };
            return Err(logs.fail(error, Default::default()));
        };

        match self.builders.build(build_type, job, &logs.callback()).await {
            Ok(result) => Ok(BuildResult {
                logs: logs.logs(),
                ..result
            }),
            Err(error) => Err(logs.fail(error, Default::default())),
        }
    }
}

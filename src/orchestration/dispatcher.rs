//! # Build Dispatcher
//!
//! Routes one job either to the strategy executor registered for its
//! `build_strategy`, or to the legacy build-type dispatch when the strategy
//! is unset, unknown, or has no executor.
//!
//! Progress reported along the way:
//!
//! ```text
//!  10  Starting build execution
//!  20  Detecting build strategy          (stage: detecting)
//!  30  Using strategy: <strategy>
//!  40  Generating build configuration    (stage: generating, only without a cached descriptor)
//!  50  Building application              (stage: building)
//!  80  Pushing to cache                  (stage: pushing, legacy pure builds)
//!  90  Build completed successfully      (strategy path)
//!  95  Push completed                    (legacy pure builds)
//! ```

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::BuildError;
use crate::executors::{
    ArtifactBuilders, BuildFailure, BuildResult, CachePusher, GeneratedInputs, LogCollector,
    StrategyExecutor,
};
use crate::models::{BuildJob, BuildType};
use crate::progress::{BuildStage, ProgressTracker};
use crate::registry::ExecutorRegistry;

pub struct BuildDispatcher {
    registry: Arc<ExecutorRegistry>,
    builders: ArtifactBuilders,
    cache_pusher: Option<Arc<dyn CachePusher>>,
    progress: Arc<dyn ProgressTracker>,
}

impl BuildDispatcher {
    pub fn new(
        registry: Arc<ExecutorRegistry>,
        builders: ArtifactBuilders,
        progress: Arc<dyn ProgressTracker>,
    ) -> Self {
        Self {
            registry,
            builders,
            cache_pusher: None,
            progress,
        }
    }

    pub fn with_cache_pusher(mut self, cache_pusher: Arc<dyn CachePusher>) -> Self {
        self.cache_pusher = Some(cache_pusher);
        self
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Execute `job`, writing every output line to `logs`.
    ///
    /// The returned result or failure carries the full text accumulated in
    /// `logs`, plus whatever the executor generated.
    pub async fn dispatch(
        &self,
        job: &BuildJob,
        logs: &LogCollector,
    ) -> Result<BuildResult, BuildFailure> {
        self.progress
            .report_progress(&job.id, 10, "Starting build execution");

        if !job.build_strategy.is_empty() {
            debug!(job_id = %job.id, strategy = %job.build_strategy, "Looking up executor for strategy");
            self.progress.report_stage(&job.id, BuildStage::Detecting);
            self.progress
                .report_progress(&job.id, 20, "Detecting build strategy");

            match self.resolve_executor(job) {
                Some(executor) => return self.run_strategy(job, executor, logs).await,
                None => warn!(
                    job_id = %job.id,
                    strategy = %job.build_strategy,
                    "No executor found for strategy, falling back to legacy build"
                ),
            }
        }

        self.progress.report_stage(&job.id, BuildStage::Building);
        self.progress
            .report_progress(&job.id, 50, "Building application");

        self.legacy_build(job, logs).await.map_err(|error| {
            logs.fail(error, GeneratedInputs::default())
        })
    }

    fn resolve_executor(&self, job: &BuildJob) -> Option<Arc<dyn StrategyExecutor>> {
        let strategy = job.strategy()?;
        self.registry.get_executor(strategy).ok()
    }

    async fn run_strategy(
        &self,
        job: &BuildJob,
        executor: Arc<dyn StrategyExecutor>,
        logs: &LogCollector,
    ) -> Result<BuildResult, BuildFailure> {
        info!(
            job_id = %job.id,
            strategy = %job.build_strategy,
            executor = executor.name(),
            "🧭 Found executor for strategy"
        );
        logs.line(&format!("=== Using strategy: {} ===", job.build_strategy));
        self.progress.report_progress(
            &job.id,
            30,
            &format!("Using strategy: {}", job.build_strategy),
        );

        if job.generated_flake.is_none() {
            self.progress.report_stage(&job.id, BuildStage::Generating);
            self.progress
                .report_progress(&job.id, 40, "Generating build configuration");
        }

        self.progress.report_stage(&job.id, BuildStage::Building);
        self.progress
            .report_progress(&job.id, 50, "Building application");

        match executor.execute(job, logs.callback()).await {
            Ok(mut result) => {
                self.progress
                    .report_progress(&job.id, 90, "Build completed successfully");
                result.logs = logs.logs();
                Ok(result)
            }
            Err(failure) => Err(logs.fail(failure.error, failure.generated)),
        }
    }

    async fn legacy_build(
        &self,
        job: &BuildJob,
        logs: &LogCollector,
    ) -> Result<BuildResult, BuildError> {
        let build_type = job
            .build_type()
            .ok_or_else(|| BuildError::UnknownBuildType {
                build_type: job.build_type.clone(),
            })?;

        let mut result = self
            .builders
            .build(build_type, job, &logs.callback())
            .await?;

        if build_type == BuildType::PureNix {
            if let Some(store_path) = result.store_path.clone() {
                self.push_to_cache(job, &store_path, logs).await?;
            }
        }

        result.logs = logs.logs();
        Ok(result)
    }

    async fn push_to_cache(
        &self,
        job: &BuildJob,
        store_path: &str,
        logs: &LogCollector,
    ) -> Result<(), BuildError> {
        let Some(pusher) = &self.cache_pusher else {
            debug!(job_id = %job.id, "No cache pusher configured, skipping closure push");
            return Ok(());
        };

        self.progress.report_stage(&job.id, BuildStage::Pushing);
        self.progress.report_progress(&job.id, 80, "Pushing to cache");

        logs.line("=== Pushing closure to binary cache ===");
        pusher
            .push_closure(store_path)
            .await
            .map_err(|err| BuildError::cache_push(&err))?;
        logs.line(&format!("Store path: {store_path}"));

        self.progress.report_progress(&job.id, 95, "Push completed");
        Ok(())
    }
}

impl std::fmt::Debug for BuildDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildDispatcher")
            .field("registry", &self.registry)
            .field("has_cache_pusher", &self.cache_pusher.is_some())
            .finish()
    }
}

//! # Build Worker
//!
//! A fixed pool of independent dequeue loops sharing one queue. Each
//! delivered job runs through the single-job pipeline:
//!
//! 1. Re-fetch the canonical record. A missing record is an orphaned queue
//!    entry and is acked; a terminal record is a stale duplicate.
//! 2. Validate. An invalid job goes `queued → running → failed` and the
//!    validation error is returned (the loop acks it).
//! 3. Enforce the strategy's artifact type, then go `queued → running`.
//! 4. Mark the deployment building. A missing deployment fails the job.
//! 5. Dispatch under the per-job timeout, streaming every output line.
//! 6. On failure either re-queue for retry (`running → queued`) or fail the
//!    job and deployment; on success mark both built.
//!
//! ## Delivery policy
//!
//! Business outcomes (succeeded, failed, re-queued) return `Ok` and the
//! delivery is acked. An `Err` other than a validation rejection or a
//! forbidden transition means the pipeline itself could not run and the
//! delivery is nacked for redelivery after the dequeue error backoff.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::bootstrap::{BuildCollaborators, WorkerComponents};
use super::dispatcher::BuildDispatcher;
use super::log_streamer::LogStreamer;
use super::recovery::{RecoveryReport, RecoveryService};
use crate::config::{BuildkeeperConfig, WorkerConfig};
use crate::constants::DEFAULT_BUILD_TIMEOUT_SECONDS;
use crate::error::BuildError;
use crate::executors::{BuildFailure, BuildResult, GeneratedInputs, LogCollector};
use crate::logging::{log_error, log_job_operation};
use crate::models::{enforce_build_type, BuildJob, Deployment, LogEntry};
use crate::progress::{BuildStage, ProgressTracker};
use crate::queue::{QueueError, SharedQueue};
use crate::retry::{BuildAttempt, RetryManager};
use crate::state_machine::{transition_job, BuildStatus};
use crate::store::SharedStore;
use crate::validation::{BuildValidator, ValidationResult};

/// Build timeout for `job`: the job's own override, then its build config,
/// then the worker default, then the built-in default.
pub fn effective_timeout(job: &BuildJob, default_seconds: u64) -> Duration {
    if job.timeout_seconds > 0 {
        return Duration::from_secs(job.timeout_seconds.unsigned_abs());
    }

    if let Some(config) = &job.build_config {
        if config.build_timeout > 0 {
            return Duration::from_secs(config.build_timeout.unsigned_abs());
        }
    }

    if default_seconds > 0 {
        return Duration::from_secs(default_seconds);
    }

    Duration::from_secs(DEFAULT_BUILD_TIMEOUT_SECONDS)
}

pub struct BuildWorker {
    config: WorkerConfig,
    store: SharedStore,
    queue: SharedQueue,
    validator: Arc<dyn BuildValidator>,
    retry: Arc<RetryManager>,
    progress: Arc<dyn ProgressTracker>,
    dispatcher: Arc<BuildDispatcher>,
    running: AtomicBool,
    shutdown_notify: Notify,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BuildWorker {
    pub fn new(
        config: WorkerConfig,
        store: SharedStore,
        queue: SharedQueue,
        components: WorkerComponents,
    ) -> Self {
        let mut dispatcher = BuildDispatcher::new(
            components.registry,
            components.builders,
            components.progress.clone(),
        );
        if let Some(cache_pusher) = components.cache_pusher {
            dispatcher = dispatcher.with_cache_pusher(cache_pusher);
        }

        Self {
            config,
            store,
            queue,
            validator: components.validator,
            retry: components.retry,
            progress: components.progress,
            dispatcher: Arc::new(dispatcher),
            running: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Build a worker with the default registry, validator, retry manager
    /// and progress tracker
    pub fn from_config(
        config: &BuildkeeperConfig,
        store: SharedStore,
        queue: SharedQueue,
        collaborators: BuildCollaborators,
    ) -> Result<Self, BuildError> {
        let components = WorkerComponents::from_config(config, collaborators)?;
        Ok(Self::new(config.worker.clone(), store, queue, components))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn progress_tracker(&self) -> &Arc<dyn ProgressTracker> {
        &self.progress
    }

    pub fn retry_manager(&self) -> &Arc<RetryManager> {
        &self.retry
    }

    pub fn dispatcher(&self) -> &BuildDispatcher {
        &self.dispatcher
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn `concurrency` worker loops
    pub fn start(self: &Arc<Self>) -> Result<(), BuildError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(BuildError::internal("build worker is already running"));
        }

        info!(concurrency = self.config.concurrency, "🚀 Starting build worker");

        let mut handles = self.handles.lock();
        for worker_id in 0..self.config.concurrency {
            let worker = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                worker.worker_loop(worker_id).await;
            }));
        }
        Ok(())
    }

    /// Run startup recovery against this worker's store and queue, then start
    /// the loops
    pub async fn start_with_recovery(self: &Arc<Self>) -> Result<RecoveryReport, BuildError> {
        let report = RecoveryService::new(self.store.clone(), self.queue.clone())
            .recover_on_startup()
            .await;
        self.start()?;
        Ok(report)
    }

    /// Signal every loop to exit and wait until they have. A job in flight
    /// is finished first.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        info!("🛑 Stopping build worker");
        self.shutdown_notify.notify_waiters();

        let handles = std::mem::take(&mut *self.handles.lock());
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Worker loop ended abnormally");
            }
        }

        info!("Build worker stopped");
    }

    /// Sleep for `duration` unless shutdown is signalled first. Returns
    /// whether the worker is still running.
    async fn pause(&self, duration: Duration) -> bool {
        let notified = self.shutdown_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if !self.is_running() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_running(),
            _ = notified => {
                debug!("Shutdown notification received");
                false
            }
        }
    }

    async fn worker_loop(&self, worker_id: usize) {
        debug!(worker_id = worker_id, "Worker loop started");

        while self.is_running() {
            let Some(dequeued) = self.dequeue_or_shutdown().await else {
                break;
            };

            let job = match dequeued {
                Ok(job) => job,
                Err(e) if e.is_no_jobs() => {
                    self.pause(self.config.empty_queue_poll_interval()).await;
                    continue;
                }
                Err(e) => {
                    error!(worker_id = worker_id, error = %e, "Failed to dequeue job");
                    self.pause(self.config.dequeue_error_backoff()).await;
                    continue;
                }
            };

            if !self.handle_delivery(worker_id, &job).await {
                self.pause(self.config.dequeue_error_backoff()).await;
            }
        }

        debug!(worker_id = worker_id, "Worker loop stopped");
    }

    /// Wait for the next delivery, or `None` once shutdown is signalled.
    /// Queues may long-poll, so the dequeue itself is raced against stop.
    async fn dequeue_or_shutdown(&self) -> Option<Result<BuildJob, QueueError>> {
        let notified = self.shutdown_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if !self.is_running() {
            return None;
        }

        tokio::select! {
            dequeued = self.queue.dequeue() => Some(dequeued),
            _ = notified => {
                debug!("Shutdown notification received while waiting for a job");
                None
            }
        }
    }

    /// Process and settle one delivery. Returns whether it was acked.
    async fn handle_delivery(&self, worker_id: usize, job: &BuildJob) -> bool {
        let acknowledge = match self.process_single_job(job).await {
            Ok(()) => true,
            Err(e) if e.acks_delivery() => {
                warn!(worker_id = worker_id, job_id = %job.id, error = %e, "Build job rejected");
                true
            }
            Err(e) => {
                log_error(
                    "build_worker",
                    "process_job",
                    &e.to_string(),
                    Some(&format!("worker_id={worker_id} job_id={}", job.id)),
                );
                false
            }
        };

        let result = if acknowledge {
            self.queue.ack(&job.id).await
        } else {
            self.queue.nack(&job.id).await
        };

        if let Err(e) = result {
            error!(
                worker_id = worker_id,
                job_id = %job.id,
                ack = acknowledge,
                error = %e,
                "Failed to settle queue delivery"
            );
        }
        acknowledge
    }

    /// Drive one delivered job through the pipeline, outside the pool loop
    pub async fn process_single_job(&self, delivered: &BuildJob) -> Result<(), BuildError> {
        info!(
            job_id = %delivered.id,
            deployment_id = %delivered.deployment_id,
            build_type = %delivered.build_type,
            build_strategy = %delivered.build_strategy,
            "📦 Processing build job"
        );

        let Some(job) = self.store.builds().get(&delivered.id).await? else {
            warn!(
                job_id = %delivered.id,
                deployment_id = %delivered.deployment_id,
                "Build record not found, removing orphaned job from queue"
            );
            return Ok(());
        };

        if job.status.is_terminal() {
            info!(job_id = %job.id, status = %job.status, "Build already finished, skipping stale delivery");
            return Ok(());
        }

        let validation = self.validator.validate(&job).await?;
        if !validation.valid {
            return Err(self.reject_invalid(job, validation).await);
        }

        for warning in &validation.warnings {
            warn!(job_id = %job.id, warning = %warning, "Build job validation warning");
        }

        let job = transition_job(enforce_strategy_build_type(job), BuildStatus::Running, false)?;
        self.store.builds().update(&job).await?;
        log_job_operation("start", &job.id, Some(&job.deployment_id), "running", None);

        let Some(mut deployment) = self.load_deployment(&job).await else {
            let job = transition_job(job, BuildStatus::Failed, false)?;
            self.persist_job(&job).await;
            self.progress.report_stage(&job.id, BuildStage::Failed);
            self.retry.clear_attempts(&job.id);
            return Ok(());
        };

        deployment.mark_building();
        if let Err(e) = self.store.deployments().update(&deployment).await {
            warn!(deployment_id = %deployment.id, error = %e, "Failed to mark deployment building");
        }

        self.progress.report_stage(&job.id, BuildStage::Building);

        let streamer = LogStreamer::start(self.store.clone(), job.deployment_id.clone());
        let logs = LogCollector::new(streamer.callback());
        let outcome = self.execute_with_timeout(&job, &logs).await;
        streamer.finish().await;

        match outcome {
            Ok(result) => self.complete_build(job, deployment, result).await,
            Err(failure) => self.handle_failure(job, deployment, failure, &logs).await,
        }
    }

    /// Record a validation rejection and hand back the error to report
    async fn reject_invalid(&self, job: BuildJob, validation: ValidationResult) -> BuildError {
        error!(job_id = %job.id, errors = ?validation.errors, "Build job validation failed");
        let rejection = BuildError::Validation {
            issues: validation.errors,
        };

        let job = match transition_job(job, BuildStatus::Running, false)
            .and_then(|job| transition_job(job, BuildStatus::Failed, false))
        {
            Ok(job) => job,
            Err(e) => return e.into(),
        };
        self.persist_job(&job).await;
        self.progress.report_stage(&job.id, BuildStage::Failed);

        if !job.deployment_id.is_empty() {
            let entry = LogEntry::build_error(job.deployment_id.as_str(), rejection.to_string());
            if let Err(e) = self.store.logs().create(&entry).await {
                error!(deployment_id = %job.deployment_id, error = %e, "Failed to store validation errors");
            }

            if let Some(mut deployment) = self.load_deployment(&job).await {
                deployment.mark_failed();
                self.persist_deployment(&deployment).await;
            }
        }

        rejection
    }

    async fn load_deployment(&self, job: &BuildJob) -> Option<Deployment> {
        match self.store.deployments().get(&job.deployment_id).await {
            Ok(Some(deployment)) => Some(deployment),
            Ok(None) => {
                warn!(
                    job_id = %job.id,
                    deployment_id = %job.deployment_id,
                    "Deployment not found for build job"
                );
                None
            }
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    deployment_id = %job.deployment_id,
                    error = %e,
                    "Failed to load deployment for build job"
                );
                None
            }
        }
    }

    async fn execute_with_timeout(
        &self,
        job: &BuildJob,
        logs: &LogCollector,
    ) -> Result<BuildResult, BuildFailure> {
        let timeout = effective_timeout(job, self.config.default_timeout_seconds);
        let dispatcher = self.dispatcher.clone();
        let build_job = job.clone();
        let build_logs = logs.clone();
        let mut build = tokio::spawn(async move { dispatcher.dispatch(&build_job, &build_logs).await });

        tokio::select! {
            joined = &mut build => match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(logs.fail(
                    BuildError::internal(format!("build task failed: {e}")),
                    GeneratedInputs::default(),
                )),
            },
            _ = tokio::time::sleep(timeout) => {
                logs.line(&format!("=== Build timeout exceeded ({}s) ===", timeout.as_secs()));
                if self.config.abort_build_on_timeout {
                    build.abort();
                } else {
                    warn!(
                        job_id = %job.id,
                        timeout_seconds = timeout.as_secs(),
                        "Build task left running after timeout"
                    );
                }
                Err(logs.fail(BuildError::Timeout { timeout }, GeneratedInputs::default()))
            }
        }
    }

    async fn handle_failure(
        &self,
        mut job: BuildJob,
        deployment: Deployment,
        failure: BuildFailure,
        logs: &LogCollector,
    ) -> Result<(), BuildError> {
        let BuildFailure {
            error, generated, ..
        } = failure;
        generated.apply_to(&mut job);

        error!(job_id = %job.id, error = %error, "Build failed");

        if self.retry.should_retry(&job, &error) {
            match self.requeue_for_retry(&job, &error).await {
                Ok(()) => return Ok(()),
                Err(e) => error!(job_id = %job.id, error = %e, "Failed to prepare build retry"),
            }
        }

        self.fail_build(job, deployment, &error, logs.logs()).await
    }

    async fn requeue_for_retry(&self, job: &BuildJob, error: &BuildError) -> Result<(), BuildError> {
        info!(job_id = %job.id, retry_count = job.retry_count, "🔁 Preparing build retry");

        self.retry
            .record_attempt(&job.id, BuildAttempt::failed(job, error))?;
        let retry_job = self.retry.prepare_retry(job)?;
        let queued = transition_job(retry_job, BuildStatus::Queued, true)?;
        self.store.builds().update(&queued).await?;

        self.pause(self.retry.backoff_duration()).await;

        match self.queue.enqueue(&queued).await {
            Ok(()) => info!(
                job_id = %queued.id,
                retry_count = queued.retry_count,
                build_type = %queued.build_type,
                "Job re-enqueued for retry"
            ),
            Err(e) => error!(
                job_id = %queued.id,
                error = %e,
                "Failed to re-enqueue job for retry, startup recovery will resubmit it"
            ),
        }
        Ok(())
    }

    async fn fail_build(
        &self,
        job: BuildJob,
        mut deployment: Deployment,
        error: &BuildError,
        logs: String,
    ) -> Result<(), BuildError> {
        self.progress.report_stage(&job.id, BuildStage::Failed);

        let job = transition_job(job, BuildStatus::Failed, false)?;
        deployment.mark_failed();
        self.persist_job(&job).await;
        self.persist_deployment(&deployment).await;

        if !logs.is_empty() {
            let entry = LogEntry::build_line(job.deployment_id.as_str(), logs);
            if let Err(e) = self.store.logs().create(&entry).await {
                error!(deployment_id = %job.deployment_id, error = %e, "Failed to store build logs");
            }
        }

        self.retry.clear_attempts(&job.id);
        log_job_operation(
            "finish",
            &job.id,
            Some(&job.deployment_id),
            "failed",
            Some(&error.to_string()),
        );
        Ok(())
    }

    async fn complete_build(
        &self,
        mut job: BuildJob,
        mut deployment: Deployment,
        result: BuildResult,
    ) -> Result<(), BuildError> {
        info!(job_id = %job.id, artifact = %result.artifact, "✅ Build succeeded");
        self.progress.report_stage(&job.id, BuildStage::Completed);

        result.generated.apply_to(&mut job);
        let job = transition_job(job, BuildStatus::Succeeded, false)?;
        deployment.mark_built(result.artifact.as_str());
        self.persist_job(&job).await;
        self.persist_deployment(&deployment).await;

        self.retry.clear_attempts(&job.id);
        log_job_operation(
            "finish",
            &job.id,
            Some(&job.deployment_id),
            "succeeded",
            Some(&result.artifact),
        );
        Ok(())
    }

    async fn persist_job(&self, job: &BuildJob) {
        if let Err(e) = self.store.builds().update(job).await {
            error!(job_id = %job.id, status = %job.status, error = %e, "Failed to update job status");
        }
    }

    async fn persist_deployment(&self, deployment: &Deployment) {
        if let Err(e) = self.store.deployments().update(deployment).await {
            error!(deployment_id = %deployment.id, error = %e, "Failed to update deployment status");
        }
    }
}

/// Overwrite the build type when the job's strategy only produces one kind
/// of artifact
fn enforce_strategy_build_type(mut job: BuildJob) -> BuildJob {
    if let (Some(strategy), Some(requested)) = (job.strategy(), job.build_type()) {
        let (enforced, changed) = enforce_build_type(strategy, requested);
        if changed {
            warn!(
                job_id = %job.id,
                strategy = %strategy,
                requested_type = %requested,
                enforced_type = %enforced,
                "Build type enforced by strategy"
            );
            job.set_build_type(enforced);
        }
    }
    job
}

impl std::fmt::Debug for BuildWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildWorker")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuildConfig, BuildStrategy, BuildType};

    fn job() -> BuildJob {
        BuildJob::new("job-1", "dep-1", "app-1", BuildType::PureNix)
    }

    #[test]
    fn test_effective_timeout_priority() {
        let config = BuildConfig {
            build_timeout: 600,
            ..Default::default()
        };

        let overridden = job().with_timeout_seconds(120).with_build_config(config.clone());
        assert_eq!(effective_timeout(&overridden, 900), Duration::from_secs(120));

        let from_config = job().with_build_config(config);
        assert_eq!(effective_timeout(&from_config, 900), Duration::from_secs(600));

        assert_eq!(effective_timeout(&job(), 900), Duration::from_secs(900));
        assert_eq!(effective_timeout(&job(), 0), Duration::from_secs(1800));
    }

    #[test]
    fn test_negative_overrides_are_ignored() {
        let negative = job().with_timeout_seconds(-5).with_build_config(BuildConfig {
            build_timeout: -1,
            ..Default::default()
        });
        assert_eq!(effective_timeout(&negative, 300), Duration::from_secs(300));
    }

    #[test]
    fn test_enforcement_only_changes_oci_only_strategies() {
        let dockerfile = enforce_strategy_build_type(job().with_strategy(BuildStrategy::Dockerfile));
        assert_eq!(dockerfile.build_type(), Some(BuildType::Oci));

        let go = enforce_strategy_build_type(job().with_strategy(BuildStrategy::AutoGo));
        assert_eq!(go.build_type(), Some(BuildType::PureNix));

        let legacy = enforce_strategy_build_type(job());
        assert_eq!(legacy.build_type(), Some(BuildType::PureNix));
    }
}

//! Shared fixtures for integration tests: scripted collaborators, job
//! builders and a fully wired worker over the in-memory store and queue.

#![allow(dead_code)]

pub mod collaborators;
pub mod strategies;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use buildkeeper_core::config::{BuildkeeperConfig, WorkerConfig};
use buildkeeper_core::error::BuildError;
use buildkeeper_core::models::{BuildJob, BuildType, Deployment};
use buildkeeper_core::orchestration::{BuildCollaborators, BuildWorker, WorkerComponents};
use buildkeeper_core::progress::DefaultProgressTracker;
use buildkeeper_core::queue::MemoryQueue;
use buildkeeper_core::retry::{FallbackNotification, RetryManager, RetryStrategy};
use buildkeeper_core::store::MemoryStore;

pub use collaborators::*;

pub const GIT_URL: &str = "https://git.example.com/acme/app.git";

/// A queued pure-nix job with a deployment id derived from `id`
pub fn pure_job(id: &str) -> BuildJob {
    BuildJob::new(id, format!("dep-{id}"), "app-1", BuildType::PureNix).with_source(GIT_URL, "main")
}

pub fn oci_job(id: &str) -> BuildJob {
    BuildJob::new(id, format!("dep-{id}"), "app-1", BuildType::Oci).with_source(GIT_URL, "main")
}

/// Fast intervals so loop tests finish quickly
pub fn test_worker_config() -> WorkerConfig {
    WorkerConfig {
        concurrency: 2,
        default_timeout_seconds: 30,
        empty_queue_poll_interval_ms: 10,
        dequeue_error_backoff_ms: 10,
        abort_build_on_timeout: true,
    }
}

pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryQueue>,
    pub pure: Arc<ScriptedBuilder>,
    pub oci: Arc<ScriptedBuilder>,
    pub detector: Arc<StubDetector>,
    pub templates: Arc<RecordingTemplateEngine>,
    pub hasher: Arc<StubHashCalculator>,
    pub cache: Arc<RecordingCachePusher>,
    pub progress: Arc<DefaultProgressTracker>,
    pub notifications: Arc<Mutex<Vec<FallbackNotification>>>,
    pub worker: Arc<BuildWorker>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(test_worker_config())
    }

    pub fn with_config(config: WorkerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let pure = Arc::new(ScriptedBuilder::new(BuildType::PureNix));
        let oci = Arc::new(ScriptedBuilder::new(BuildType::Oci));
        let detector = Arc::new(StubDetector::new());
        let templates = Arc::new(RecordingTemplateEngine::new());
        let hasher = Arc::new(StubHashCalculator::new());
        let cache = Arc::new(RecordingCachePusher::new());
        let progress = Arc::new(DefaultProgressTracker::new());

        let notifications = Arc::new(Mutex::new(Vec::new()));
        let sink = notifications.clone();
        let retry = RetryManager::new(RetryStrategy {
            backoff: Duration::ZERO,
            ..RetryStrategy::default()
        })
        .with_notification_callback(Arc::new(move |notification: &FallbackNotification| {
            sink.lock().push(notification.clone());
        }));

        let collaborators = BuildCollaborators::new(
            pure.clone(),
            oci.clone(),
            detector.clone(),
            templates.clone(),
            hasher.clone(),
        )
        .with_cache_pusher(cache.clone());

        let components = WorkerComponents::from_config(&BuildkeeperConfig::default(), collaborators)
            .expect("default registry covers every required strategy")
            .with_retry_manager(retry)
            .with_progress_tracker(progress.clone());

        let worker = Arc::new(BuildWorker::new(
            config,
            store.clone(),
            queue.clone(),
            components,
        ));

        Self {
            store,
            queue,
            pure,
            oci,
            detector,
            templates,
            hasher,
            cache,
            progress,
            notifications,
            worker,
        }
    }

    /// Persist `job` and its deployment the way the submission path would
    pub fn submit(&self, job: &BuildJob) {
        self.store.insert_job(job.clone());
        if !job.deployment_id.is_empty() {
            self.store
                .insert_deployment(Deployment::new(job.deployment_id.as_str(), job.app_id.as_str()));
        }
    }

    pub async fn submit_and_enqueue(&self, job: &BuildJob) {
        use buildkeeper_core::queue::Queue;

        self.submit(job);
        self.queue.enqueue(job).await.expect("enqueue");
    }

    pub async fn process(&self, job: &BuildJob) -> Result<(), BuildError> {
        self.worker.process_single_job(job).await
    }

    /// Dequeue the next job and process it, as one loop iteration would
    pub async fn process_next(&self) -> Result<(), BuildError> {
        use buildkeeper_core::queue::Queue;

        let job = self.queue.dequeue().await.expect("a queued job");
        let result = self.process(&job).await;
        self.queue.ack(&job.id).await.expect("ack");
        result
    }

    pub fn stored(&self, id: &str) -> BuildJob {
        self.store.job(id).expect("job record")
    }

    pub fn deployment_of(&self, job: &BuildJob) -> Deployment {
        self.store
            .deployment(&job.deployment_id)
            .expect("deployment record")
    }

    pub fn progress_percents(&self, id: &str) -> Vec<u8> {
        self.progress
            .progress_history(id)
            .into_iter()
            .map(|record| record.percent)
            .collect()
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

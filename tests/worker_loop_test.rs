//! Worker pool lifecycle and delivery settlement

mod common;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use buildkeeper_core::config::BuildkeeperConfig;
use buildkeeper_core::models::{BuildJob, BuildStrategy, BuildType, DeploymentStatus};
use buildkeeper_core::orchestration::{BuildCollaborators, BuildWorker, WorkerComponents};
use buildkeeper_core::queue::{Queue, QueueResult};
use buildkeeper_core::state_machine::BuildStatus;
use buildkeeper_core::store::MemoryStore;
use common::*;

const WAIT: Duration = Duration::from_secs(5);

/// Long-poll queue that never delivers
struct NeverDeliveringQueue;

#[async_trait]
impl Queue for NeverDeliveringQueue {
    async fn enqueue(&self, _job: &BuildJob) -> QueueResult<()> {
        Ok(())
    }

    async fn dequeue(&self) -> QueueResult<BuildJob> {
        std::future::pending().await
    }

    async fn ack(&self, _job_id: &str) -> QueueResult<()> {
        Ok(())
    }

    async fn nack(&self, _job_id: &str) -> QueueResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_start_and_stop() {
    let harness = TestHarness::new();
    assert!(!harness.worker.is_running());

    harness.worker.start().unwrap();
    assert!(harness.worker.is_running());

    harness.worker.stop().await;
    assert!(!harness.worker.is_running());

    // Stopping twice is a no-op
    harness.worker.stop().await;
}

#[tokio::test]
async fn test_double_start_is_rejected() {
    let harness = TestHarness::new();
    harness.worker.start().unwrap();

    let err = harness.worker.start().unwrap_err();
    assert!(err.to_string().contains("already running"));

    harness.worker.stop().await;
}

#[tokio::test]
async fn test_pool_drains_queue() {
    let harness = TestHarness::new();
    let jobs: Vec<_> = (0..5).map(|i| oci_job(&format!("job-{i}"))).collect();
    for job in &jobs {
        harness.submit_and_enqueue(job).await;
    }

    harness.worker.start().unwrap();
    let store = harness.store.clone();
    let all_done = wait_for(WAIT, || {
        (0..5).all(|i| {
            store
                .job(&format!("job-{i}"))
                .is_some_and(|job| job.status == BuildStatus::Succeeded)
        })
    })
    .await;
    harness.worker.stop().await;

    assert!(all_done);
    assert_eq!(harness.oci.call_count(), 5);
    assert_eq!(harness.queue.acked_ids().len(), 5);
    assert!(harness.queue.nacked_ids().is_empty());
    assert_eq!(harness.queue.in_flight_len(), 0);
    for job in &jobs {
        assert_eq!(harness.deployment_of(job).status, DeploymentStatus::Built);
    }
}

#[tokio::test]
async fn test_fallback_retry_runs_through_the_loop() {
    let harness = TestHarness::new();
    let job = pure_job("job-c").with_strategy(BuildStrategy::AutoGo);
    harness.pure.fail_with("ld: cannot find -lssl");
    harness.submit_and_enqueue(&job).await;

    harness.worker.start().unwrap();
    let store = harness.store.clone();
    let done = wait_for(WAIT, || {
        store
            .job("job-c")
            .is_some_and(|job| job.status == BuildStatus::Succeeded)
    })
    .await;
    harness.worker.stop().await;

    assert!(done);
    assert_eq!(harness.pure.call_count(), 1);
    assert_eq!(harness.oci.call_count(), 1);
    assert!(harness.queue.nacked_ids().is_empty());
    assert_eq!(harness.notifications.lock().len(), 1);
}

#[tokio::test]
async fn test_invalid_job_is_acked() {
    let harness = TestHarness::new();
    let mut job = oci_job("job-1");
    job.build_type = "docker".to_string();
    harness.submit_and_enqueue(&job).await;

    harness.worker.start().unwrap();
    let queue = harness.queue.clone();
    let settled = wait_for(WAIT, || queue.acked_ids() == vec!["job-1"]).await;
    harness.worker.stop().await;

    assert!(settled);
    assert!(harness.queue.nacked_ids().is_empty());
    assert_eq!(harness.stored("job-1").status, BuildStatus::Failed);
    assert_eq!(harness.oci.call_count(), 0);
}

#[tokio::test]
async fn test_store_outage_nacks_until_store_recovers() {
    let harness = TestHarness::new();
    let job = oci_job("job-1");
    harness.submit_and_enqueue(&job).await;
    harness.store.fail_job_reads("job-1");

    harness.worker.start().unwrap();
    let queue = harness.queue.clone();
    assert!(wait_for(WAIT, || !queue.nacked_ids().is_empty()).await);
    assert_eq!(harness.stored("job-1").status, BuildStatus::Queued);

    harness.store.clear_failures();
    let store = harness.store.clone();
    let done = wait_for(WAIT, || {
        store
            .job("job-1")
            .is_some_and(|job| job.status == BuildStatus::Succeeded)
    })
    .await;
    harness.worker.stop().await;

    assert!(done);
    assert_eq!(harness.oci.call_count(), 1);
}

#[tokio::test]
async fn test_dequeue_errors_do_not_stop_the_loop() {
    let harness = TestHarness::new();
    harness.queue.fail_next_dequeues(3);
    let job = oci_job("job-1");
    harness.submit_and_enqueue(&job).await;

    harness.worker.start().unwrap();
    let store = harness.store.clone();
    let done = wait_for(WAIT, || {
        store
            .job("job-1")
            .is_some_and(|job| job.status == BuildStatus::Succeeded)
    })
    .await;
    harness.worker.stop().await;

    assert!(done);
}

#[tokio::test]
async fn test_start_with_recovery_resumes_and_fails_leftovers() {
    let harness = TestHarness::new();
    let pending = oci_job("pending");
    harness.submit(&pending);

    let mut interrupted = pure_job("interrupted");
    interrupted.status = BuildStatus::Running;
    harness.submit(&interrupted);

    let report = harness.worker.start_with_recovery().await.unwrap();
    assert_eq!(report.interrupted_builds, 1);
    assert_eq!(report.resumed_builds, 1);

    let store = harness.store.clone();
    let done = wait_for(WAIT, || {
        store
            .job("pending")
            .is_some_and(|job| job.status == BuildStatus::Succeeded)
    })
    .await;
    harness.worker.stop().await;

    assert!(done);
    assert_eq!(harness.stored("interrupted").status, BuildStatus::Failed);
    assert_eq!(
        harness.deployment_of(&interrupted).status,
        DeploymentStatus::Failed
    );
    assert_eq!(harness.pure.call_count(), 0);
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_build() {
    let harness = TestHarness::new();
    let job = oci_job("job-1");
    harness.submit_and_enqueue(&job).await;

    harness.worker.start().unwrap();
    let oci = harness.oci.clone();
    assert!(wait_for(WAIT, || oci.call_count() == 1).await);
    harness.worker.stop().await;

    assert_eq!(harness.stored("job-1").status, BuildStatus::Succeeded);
    assert_eq!(harness.queue.acked_ids(), vec!["job-1"]);
}

#[tokio::test]
async fn test_stop_interrupts_blocked_dequeue() {
    let collaborators = BuildCollaborators::new(
        Arc::new(ScriptedBuilder::new(BuildType::PureNix)),
        Arc::new(ScriptedBuilder::new(BuildType::Oci)),
        Arc::new(StubDetector::new()),
        Arc::new(RecordingTemplateEngine::new()),
        Arc::new(StubHashCalculator::new()),
    );
    let components =
        WorkerComponents::from_config(&BuildkeeperConfig::default(), collaborators).unwrap();
    let worker = Arc::new(BuildWorker::new(
        test_worker_config(),
        Arc::new(MemoryStore::new()),
        Arc::new(NeverDeliveringQueue),
        components,
    ));

    worker.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stopped = tokio::time::timeout(Duration::from_secs(3), worker.stop()).await;
    assert!(stopped.is_ok(), "stop() must not wait on a pending dequeue");
    assert!(!worker.is_running());
}

//! # Startup Recovery
//!
//! Reconciles job state left behind by a previous process before the worker
//! pool starts draining the queue.
//!
//! 1. Interrupted builds: no job can legitimately be `running` while no
//!    worker is alive, so every `running` job is failed and its deployment is
//!    marked failed.
//! 2. Pending builds: every `queued` job is re-submitted to the queue, since
//!    its original enqueue may have been lost. Status is left untouched.
//!
//! Recovery is best-effort. Errors are collected into the report and never
//! abort the pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::BuildError;
use crate::models::BuildJob;
use crate::queue::SharedQueue;
use crate::state_machine::{transition_job, BuildStatus};
use crate::store::SharedStore;

/// Which half of the recovery pass an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPhase {
    InterruptedBuilds,
    PendingBuilds,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryIssue {
    pub phase: RecoveryPhase,
    /// `None` when listing the jobs failed
    pub job_id: Option<String>,
    pub error: BuildError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryReport {
    /// Running jobs moved to `failed`
    pub interrupted_builds: usize,
    /// Queued jobs re-submitted to the queue
    pub resumed_builds: usize,
    pub errors: Vec<RecoveryIssue>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct RecoveryService {
    store: SharedStore,
    queue: SharedQueue,
}

impl RecoveryService {
    pub fn new(store: SharedStore, queue: SharedQueue) -> Self {
        Self { store, queue }
    }

    /// Run both recovery phases. Never fails; see [`RecoveryReport::errors`].
    pub async fn recover_on_startup(&self) -> RecoveryReport {
        let started_at = Utc::now();
        info!("🔄 Starting build queue recovery");

        let mut errors = Vec::new();
        let interrupted_builds = self.recover_interrupted_builds(&mut errors).await;
        let resumed_builds = self.resume_pending_builds(&mut errors).await;

        let report = RecoveryReport {
            interrupted_builds,
            resumed_builds,
            errors,
            started_at,
            completed_at: Utc::now(),
        };

        info!(
            interrupted_builds = report.interrupted_builds,
            resumed_builds = report.resumed_builds,
            errors = report.errors.len(),
            "✅ Build queue recovery completed"
        );
        report
    }

    async fn recover_interrupted_builds(&self, errors: &mut Vec<RecoveryIssue>) -> usize {
        let running = match self.store.builds().list_running().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Failed to list running builds");
                errors.push(RecoveryIssue {
                    phase: RecoveryPhase::InterruptedBuilds,
                    job_id: None,
                    error: e.into(),
                });
                return 0;
            }
        };

        let mut recovered = 0;
        for job in running {
            let job_id = job.id.clone();
            match self.fail_interrupted(job).await {
                Ok(()) => recovered += 1,
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Failed to recover interrupted build");
                    errors.push(RecoveryIssue {
                        phase: RecoveryPhase::InterruptedBuilds,
                        job_id: Some(job_id),
                        error: e,
                    });
                }
            }
        }
        recovered
    }

    async fn fail_interrupted(&self, job: BuildJob) -> Result<(), BuildError> {
        info!(
            job_id = %job.id,
            deployment_id = %job.deployment_id,
            "Marking interrupted build as failed"
        );

        let job = transition_job(job, BuildStatus::Failed, false)?;
        self.store.builds().update(&job).await?;

        match self.store.deployments().get(&job.deployment_id).await {
            Ok(Some(mut deployment)) => {
                deployment.mark_failed();
                if let Err(e) = self.store.deployments().update(&deployment).await {
                    warn!(
                        deployment_id = %deployment.id,
                        error = %e,
                        "Failed to mark deployment of interrupted build as failed"
                    );
                }
            }
            Ok(None) => warn!(
                job_id = %job.id,
                deployment_id = %job.deployment_id,
                "Deployment of interrupted build not found"
            ),
            Err(e) => warn!(
                deployment_id = %job.deployment_id,
                error = %e,
                "Failed to load deployment of interrupted build"
            ),
        }
        Ok(())
    }

    async fn resume_pending_builds(&self, errors: &mut Vec<RecoveryIssue>) -> usize {
        let queued = match self.store.builds().list_queued().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Failed to list queued builds");
                errors.push(RecoveryIssue {
                    phase: RecoveryPhase::PendingBuilds,
                    job_id: None,
                    error: e.into(),
                });
                return 0;
            }
        };

        let mut resumed = 0;
        for job in queued {
            info!(job_id = %job.id, deployment_id = %job.deployment_id, "Re-queuing pending build");
            match self.queue.enqueue(&job).await {
                Ok(()) => resumed += 1,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Failed to re-queue pending build");
                    errors.push(RecoveryIssue {
                        phase: RecoveryPhase::PendingBuilds,
                        job_id: Some(job.id.clone()),
                        error: e.into(),
                    });
                }
            }
        }
        resumed
    }
}

impl std::fmt::Debug for RecoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryService").finish_non_exhaustive()
    }
}

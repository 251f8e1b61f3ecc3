//! # Build Job Transitions
//!
//! The transition table:
//!
//! ```text
//! queued  ──▶ running
//! running ──▶ succeeded | failed
//! running ──▶ queued            (retry flag only)
//! ```
//!
//! Every other pair, self-transitions included, is rejected. `succeeded` and
//! `failed` have no outgoing edges.

use chrono::Utc;

use super::errors::StateMachineError;
use super::states::BuildStatus;
use crate::models::BuildJob;

/// Whether `from → to` is permitted
pub fn can_transition(from: BuildStatus, to: BuildStatus, is_retry: bool) -> bool {
    use BuildStatus::*;

    match (from, to) {
        (Queued, Running) => true,
        (Running, Succeeded) | (Running, Failed) => true,
        (Running, Queued) => is_retry,
        _ => false,
    }
}

pub fn is_terminal_state(status: BuildStatus) -> bool {
    status.is_terminal()
}

/// Apply a status change to a job, returning the updated job.
///
/// Entering `running` stamps `started_at`; entering a terminal status stamps
/// `finished_at`; a retry back to `queued` clears both.
pub fn transition_job(
    mut job: BuildJob,
    to: BuildStatus,
    is_retry: bool,
) -> Result<BuildJob, StateMachineError> {
    let from = job.status;
    if !can_transition(from, to, is_retry) {
        return Err(StateMachineError::InvalidTransition {
            job_id: job.id.clone(),
            from,
            to,
            is_retry,
        });
    }

    let now = Utc::now();
    match to {
        BuildStatus::Running => {
            job.started_at = Some(now);
            job.finished_at = None;
        }
        BuildStatus::Succeeded | BuildStatus::Failed => {
            job.finished_at = Some(now);
        }
        BuildStatus::Queued => {
            job.started_at = None;
            job.finished_at = None;
        }
    }
    job.status = to;

    Ok(job)
}

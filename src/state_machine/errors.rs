use thiserror::Error;

use super::states::BuildStatus;

/// Errors raised when a status change violates the transition table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("invalid state transition for job {job_id}: {from} -> {to} (retry: {is_retry})")]
    InvalidTransition {
        job_id: String,
        from: BuildStatus,
        to: BuildStatus,
        is_retry: bool,
    },
}

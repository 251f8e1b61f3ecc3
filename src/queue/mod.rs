//! # Build Queue Contract
//!
//! At-least-once delivery of build jobs. `dequeue` signals an empty queue
//! with the distinguished [`QueueError::NoJobs`], which callers treat as a
//! polling signal rather than a failure. A dequeued job stays in flight until
//! it is acked (done) or nacked (redeliver).

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::models::BuildJob;

pub mod memory;

pub use memory::MemoryQueue;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("no jobs available")]
    NoJobs,

    #[error("job not in flight: {job_id}")]
    JobNotFound { job_id: String },

    #[error("queue backend error: {operation}: {message}")]
    Backend { operation: String, message: String },
}

impl QueueError {
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn is_no_jobs(&self) -> bool {
        matches!(self, Self::NoJobs)
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

#[async_trait]
pub trait Queue: Send + Sync {
    async fn enqueue(&self, job: &BuildJob) -> QueueResult<()>;

    async fn dequeue(&self) -> QueueResult<BuildJob>;

    async fn ack(&self, job_id: &str) -> QueueResult<()>;

    async fn nack(&self, job_id: &str) -> QueueResult<()>;
}

pub type SharedQueue = Arc<dyn Queue>;

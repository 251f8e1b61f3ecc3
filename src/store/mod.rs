//! # Persistence Contracts
//!
//! The build core reads and writes three kinds of record through these
//! traits: build jobs, deployments and an append-only log sink.
//! Implementations are expected to provide atomic single-record writes and
//! to be safe for concurrent use by every worker loop.
//!
//! [`MemoryStore`] is a thread-safe in-memory implementation for single-node
//! embedders and tests.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{BuildJob, Deployment, LogEntry};

pub mod memory;

pub use memory::MemoryStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("store backend error: {operation}: {message}")]
    Backend { operation: String, message: String },
}

impl StoreError {
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait BuildStore: Send + Sync {
    async fn create(&self, job: &BuildJob) -> StoreResult<()>;

    /// `Ok(None)` when no record exists
    async fn get(&self, id: &str) -> StoreResult<Option<BuildJob>>;

    async fn update(&self, job: &BuildJob) -> StoreResult<()>;

    async fn list_running(&self) -> StoreResult<Vec<BuildJob>>;

    async fn list_queued(&self) -> StoreResult<Vec<BuildJob>>;
}

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// `Ok(None)` when no record exists
    async fn get(&self, id: &str) -> StoreResult<Option<Deployment>>;

    async fn update(&self, deployment: &Deployment) -> StoreResult<()>;
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn create(&self, entry: &LogEntry) -> StoreResult<()>;
}

/// Access to the three record stores
pub trait Store: Send + Sync {
    fn builds(&self) -> &dyn BuildStore;

    fn deployments(&self) -> &dyn DeploymentStore;

    fn logs(&self) -> &dyn LogStore;
}

pub type SharedStore = Arc<dyn Store>;

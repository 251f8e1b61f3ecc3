use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};

use super::{BuildStore, DeploymentStore, LogStore, Store, StoreError, StoreResult};
use crate::models::{BuildJob, Deployment, LogEntry};
use crate::state_machine::BuildStatus;

/// In-memory [`Store`].
///
/// Records every status a job is written with, and can be told to fail reads
/// or writes for chosen ids to exercise infrastructure-failure paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    builds: MemoryBuildStore,
    deployments: MemoryDeploymentStore,
    logs: MemoryLogStore,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_job(&self, job: BuildJob) {
        self.builds.record_status(&job);
        self.builds.jobs.write().insert(job.id.clone(), job);
    }

    pub fn remove_job(&self, id: &str) -> Option<BuildJob> {
        self.builds.jobs.write().remove(id)
    }

    pub fn insert_deployment(&self, deployment: Deployment) {
        self.deployments
            .deployments
            .write()
            .insert(deployment.id.clone(), deployment);
    }

    pub fn job(&self, id: &str) -> Option<BuildJob> {
        self.builds.jobs.read().get(id).cloned()
    }

    pub fn deployment(&self, id: &str) -> Option<Deployment> {
        self.deployments.deployments.read().get(id).cloned()
    }

    /// Every status the job has been written with, oldest first
    pub fn status_history(&self, id: &str) -> Vec<BuildStatus> {
        self.builds
            .history
            .lock()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn log_entries(&self, deployment_id: &str) -> Vec<LogEntry> {
        self.logs
            .entries
            .lock()
            .iter()
            .filter(|entry| entry.deployment_id == deployment_id)
            .cloned()
            .collect()
    }

    pub fn log_messages(&self, deployment_id: &str) -> Vec<String> {
        self.log_entries(deployment_id)
            .into_iter()
            .map(|entry| entry.message)
            .collect()
    }

    /// Make `get` for this job id fail with a backend error
    pub fn fail_job_reads(&self, id: &str) {
        self.builds.failing_reads.lock().insert(id.to_string());
    }

    /// Make `update` for this job id fail with a backend error
    pub fn fail_job_updates(&self, id: &str) {
        self.builds.failing_updates.lock().insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        self.builds.failing_reads.lock().clear();
        self.builds.failing_updates.lock().clear();
    }
}

impl Store for MemoryStore {
    fn builds(&self) -> &dyn BuildStore {
        &self.builds
    }

    fn deployments(&self) -> &dyn DeploymentStore {
        &self.deployments
    }

    fn logs(&self) -> &dyn LogStore {
        &self.logs
    }
}

#[derive(Debug, Default)]
struct MemoryBuildStore {
    jobs: RwLock<HashMap<String, BuildJob>>,
    history: Mutex<HashMap<String, Vec<BuildStatus>>>,
    failing_reads: Mutex<HashSet<String>>,
    failing_updates: Mutex<HashSet<String>>,
}

impl MemoryBuildStore {
    fn record_status(&self, job: &BuildJob) {
        self.history
            .lock()
            .entry(job.id.clone())
            .or_default()
            .push(job.status);
    }

    fn list_with_status(&self, status: BuildStatus) -> Vec<BuildJob> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }
}

#[async_trait]
impl BuildStore for MemoryBuildStore {
    async fn create(&self, job: &BuildJob) -> StoreResult<()> {
        {
            let mut jobs = self.jobs.write();
            if jobs.contains_key(&job.id) {
                return Err(StoreError::AlreadyExists {
                    entity: "build job",
                    id: job.id.clone(),
                });
            }
            jobs.insert(job.id.clone(), job.clone());
        }
        self.record_status(job);
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<BuildJob>> {
        if self.failing_reads.lock().contains(id) {
            return Err(StoreError::backend("get build job", "connection reset"));
        }
        Ok(self.jobs.read().get(id).cloned())
    }

    async fn update(&self, job: &BuildJob) -> StoreResult<()> {
        if self.failing_updates.lock().contains(&job.id) {
            return Err(StoreError::backend("update build job", "connection reset"));
        }
        {
            let mut jobs = self.jobs.write();
            let Some(existing) = jobs.get_mut(&job.id) else {
                return Err(StoreError::NotFound {
                    entity: "build job",
                    id: job.id.clone(),
                });
            };
            *existing = job.clone();
        }
        self.record_status(job);
        Ok(())
    }

    async fn list_running(&self) -> StoreResult<Vec<BuildJob>> {
        Ok(self.list_with_status(BuildStatus::Running))
    }

    async fn list_queued(&self) -> StoreResult<Vec<BuildJob>> {
        Ok(self.list_with_status(BuildStatus::Queued))
    }
}

#[derive(Debug, Default)]
struct MemoryDeploymentStore {
    deployments: RwLock<HashMap<String, Deployment>>,
}

#[async_trait]
impl DeploymentStore for MemoryDeploymentStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Deployment>> {
        Ok(self.deployments.read().get(id).cloned())
    }

    async fn update(&self, deployment: &Deployment) -> StoreResult<()> {
        let mut deployments = self.deployments.write();
        let Some(existing) = deployments.get_mut(&deployment.id) else {
            return Err(StoreError::NotFound {
                entity: "deployment",
                id: deployment.id.clone(),
            });
        };
        *existing = deployment.clone();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryLogStore {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn create(&self, entry: &LogEntry) -> StoreResult<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

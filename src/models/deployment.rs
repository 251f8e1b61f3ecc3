use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment lifecycle status
///
/// The build core only ever moves a deployment through `building` and then
/// `built` or `failed`; the remaining values belong to the scheduling side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Building,
    Built,
    Scheduled,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Built => "built",
            Self::Scheduled => "scheduled",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(value)
    }
}

/// The record a build job produces an artifact for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub app_id: String,
    #[serde(default)]
    pub git_ref: String,
    pub status: DeploymentStatus,
    /// Store path or image tag, set once the build succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    pub fn new(id: impl Into<String>, app_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            app_id: app_id.into(),
            git_ref: String::new(),
            status: DeploymentStatus::Pending,
            artifact: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_building(&mut self) {
        self.set_status(DeploymentStatus::Building);
    }

    pub fn mark_built(&mut self, artifact: impl Into<String>) {
        self.artifact = Some(artifact.into());
        self.set_status(DeploymentStatus::Built);
    }

    pub fn mark_failed(&mut self) {
        self.set_status(DeploymentStatus::Failed);
    }

    fn set_status(&mut self, status: DeploymentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::log_tags;

/// A single persisted log record for a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub deployment_id: String,
    /// "build" or "runtime"
    pub source: String,
    pub level: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(
        deployment_id: impl Into<String>,
        source: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            deployment_id: deployment_id.into(),
            source: source.into(),
            level: level.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// One line of builder output
    pub fn build_line(deployment_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            deployment_id,
            log_tags::BUILD_SOURCE,
            log_tags::INFO_LEVEL,
            message,
        )
    }

    pub fn build_error(deployment_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            deployment_id,
            log_tags::BUILD_SOURCE,
            log_tags::ERROR_LEVEL,
            message,
        )
    }
}

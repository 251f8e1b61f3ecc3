//! # Build Progress Tracking
//!
//! Stage and percentage telemetry for observability. Progress is a side
//! channel: nothing in the pipeline reads it back to make a decision.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// A phase in the build process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Cloning,
    Detecting,
    Generating,
    CalculatingHash,
    Building,
    Pushing,
    Completed,
    Failed,
}

impl BuildStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Cloning => "Cloning repository",
            Self::Detecting => "Detecting language and framework",
            Self::Generating => "Generating build descriptor",
            Self::CalculatingHash => "Calculating dependency hash",
            Self::Building => "Building artifact",
            Self::Pushing => "Pushing to binary cache",
            Self::Completed => "Build completed",
            Self::Failed => "Build failed",
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Cloning => "cloning",
            Self::Detecting => "detecting",
            Self::Generating => "generating",
            Self::CalculatingHash => "calculating_hash",
            Self::Building => "building",
            Self::Pushing => "pushing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub build_id: String,
    pub percent: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub build_id: String,
    pub stage: BuildStage,
    pub timestamp: DateTime<Utc>,
}

/// Receives build telemetry
pub trait ProgressTracker: Send + Sync {
    fn report_stage(&self, build_id: &str, stage: BuildStage);

    fn report_progress(&self, build_id: &str, percent: u8, message: &str);
}

/// Logs progress and keeps a per-build history
#[derive(Debug, Default)]
pub struct DefaultProgressTracker {
    progress_history: DashMap<String, Vec<ProgressRecord>>,
    stage_history: DashMap<String, Vec<StageRecord>>,
}

impl DefaultProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress_history(&self, build_id: &str) -> Vec<ProgressRecord> {
        self.progress_history
            .get(build_id)
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn stage_history(&self, build_id: &str) -> Vec<StageRecord> {
        self.stage_history
            .get(build_id)
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn is_progress_monotonic(&self, build_id: &str) -> bool {
        self.progress_history
            .get(build_id)
            .map(|history| history.windows(2).all(|pair| pair[0].percent <= pair[1].percent))
            .unwrap_or(true)
    }

    pub fn has_terminal_stage(&self, build_id: &str) -> bool {
        self.stage_history
            .get(build_id)
            .is_some_and(|history| history.iter().any(|record| record.stage.is_terminal()))
    }

    pub fn last_stage(&self, build_id: &str) -> Option<BuildStage> {
        self.stage_history
            .get(build_id)
            .and_then(|history| history.last().map(|record| record.stage))
    }

    pub fn clear_history(&self, build_id: &str) {
        self.progress_history.remove(build_id);
        self.stage_history.remove(build_id);
    }
}

impl ProgressTracker for DefaultProgressTracker {
    fn report_stage(&self, build_id: &str, stage: BuildStage) {
        info!(build_id = %build_id, stage = %stage, "📍 {}", stage.description());

        self.stage_history
            .entry(build_id.to_string())
            .or_default()
            .push(StageRecord {
                build_id: build_id.to_string(),
                stage,
                timestamp: Utc::now(),
            });
    }

    fn report_progress(&self, build_id: &str, percent: u8, message: &str) {
        let mut history = self.progress_history.entry(build_id.to_string()).or_default();

        if let Some(last) = history.last() {
            if percent < last.percent {
                warn!(
                    build_id = %build_id,
                    previous_percent = last.percent,
                    new_percent = percent,
                    message = %message,
                    "⚠️ Non-monotonic progress detected"
                );
            }
        }

        info!(build_id = %build_id, percent = percent, message = %message, "📈 Build progress");

        history.push(ProgressRecord {
            build_id: build_id.to_string(),
            percent,
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }
}

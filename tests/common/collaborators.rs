//! Scripted stand-ins for the external build tools

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use buildkeeper_core::executors::{
    ArtifactBuilder, ArtifactOutput, BuilderFailure, CachePusher, Detector, HashCalculator,
    Language, LogCallback, TemplateData, TemplateEngine,
};
use buildkeeper_core::models::{BuildConfig, BuildJob, BuildType, DetectionResult};

/// What the next build call does
#[derive(Debug, Clone)]
pub enum BuildStep {
    Succeed,
    Fail(String),
    /// Never finish; only a timeout ends it
    Hang,
    /// Finish with an error after the delay, printing one last line
    Slow(Duration),
}

/// Artifact builder that follows a script, succeeding once the script is
/// exhausted
pub struct ScriptedBuilder {
    build_type: BuildType,
    steps: Mutex<VecDeque<BuildStep>>,
    calls: Mutex<Vec<BuildJob>>,
    finished: AtomicUsize,
}

impl ScriptedBuilder {
    pub fn new(build_type: BuildType) -> Self {
        Self {
            build_type,
            steps: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            finished: AtomicUsize::new(0),
        }
    }

    pub fn script(&self, steps: impl IntoIterator<Item = BuildStep>) {
        self.steps.lock().extend(steps);
    }

    pub fn fail_with(&self, message: &str) {
        self.script([BuildStep::Fail(message.to_string())]);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Builds that ran to completion, successful or not
    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Jobs as the builder saw them, oldest first
    pub fn calls(&self) -> Vec<BuildJob> {
        self.calls.lock().clone()
    }

    pub fn artifact_for(&self, job: &BuildJob) -> String {
        match self.build_type {
            BuildType::PureNix => format!("/nix/store/abc123-{}", job.app_id),
            BuildType::Oci => format!("registry.example.com/{}:{}", job.app_id, job.id),
        }
    }
}

#[async_trait]
impl ArtifactBuilder for ScriptedBuilder {
    async fn build_with_log_callback(
        &self,
        job: &BuildJob,
        on_line: &LogCallback,
    ) -> Result<ArtifactOutput, BuilderFailure> {
        self.calls.lock().push(job.clone());
        let step = self.steps.lock().pop_front().unwrap_or(BuildStep::Succeed);

        on_line(&format!("building {} as {}", job.id, self.build_type));

        match step {
            BuildStep::Succeed => {
                let artifact = self.artifact_for(job);
                on_line("build finished");
                self.finished.fetch_add(1, Ordering::SeqCst);
                let (store_path, image_tag) = match self.build_type {
                    BuildType::PureNix => (Some(artifact), None),
                    BuildType::Oci => (None, Some(artifact)),
                };
                Ok(ArtifactOutput {
                    store_path,
                    image_tag,
                    logs: String::new(),
                    exit_code: 0,
                })
            }
            BuildStep::Fail(message) => {
                on_line(&format!("error: {message}"));
                self.finished.fetch_add(1, Ordering::SeqCst);
                Err(BuilderFailure::new(message).with_exit_code(1))
            }
            BuildStep::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(BuilderFailure::new("hung build finished"))
            }
            BuildStep::Slow(delay) => {
                tokio::time::sleep(delay).await;
                on_line("late output after the deadline");
                self.finished.fetch_add(1, Ordering::SeqCst);
                Err(BuilderFailure::new("slow build gave up").with_exit_code(1))
            }
        }
    }
}

pub struct StubDetector {
    calls: AtomicUsize,
    failure: Mutex<Option<String>>,
}

impl StubDetector {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for StubDetector {
    async fn detect(&self, _job: &BuildJob, language: Language) -> anyhow::Result<DetectionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.lock().clone() {
            anyhow::bail!(message);
        }

        Ok(DetectionResult {
            strategy: Some(language.strategy()),
            framework: String::new(),
            version: "1.22".to_string(),
            entry_points: vec!["cmd/server".to_string()],
            suggested_config: BuildConfig::default(),
            recommended_build_type: Some(BuildType::PureNix),
            confidence: 0.9,
        })
    }
}

pub struct RecordingTemplateEngine {
    rendered: Mutex<Vec<String>>,
}

impl RecordingTemplateEngine {
    pub fn new() -> Self {
        Self {
            rendered: Mutex::new(Vec::new()),
        }
    }

    /// Template names rendered so far
    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().clone()
    }
}

#[async_trait]
impl TemplateEngine for RecordingTemplateEngine {
    async fn render(&self, template: &str, data: &TemplateData) -> anyhow::Result<String> {
        self.rendered.lock().push(template.to_string());
        Ok(format!("# {template}\n{{ description = \"{}\"; }}", data.app_name))
    }
}

pub struct StubHashCalculator {
    calls: AtomicUsize,
}

impl StubHashCalculator {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HashCalculator for StubHashCalculator {
    async fn vendor_hash(&self, _job: &BuildJob, _language: Language) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("sha256-AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string())
    }
}

pub struct RecordingCachePusher {
    pushed: Mutex<Vec<String>>,
    failure: Mutex<Option<String>>,
}

impl RecordingCachePusher {
    pub fn new() -> Self {
        Self {
            pushed: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    pub fn pushed(&self) -> Vec<String> {
        self.pushed.lock().clone()
    }
}

#[async_trait]
impl CachePusher for RecordingCachePusher {
    async fn push_closure(&self, store_path: &str) -> anyhow::Result<()> {
        if let Some(message) = self.failure.lock().clone() {
            anyhow::bail!(message);
        }
        self.pushed.lock().push(store_path.to_string());
        Ok(())
    }
}

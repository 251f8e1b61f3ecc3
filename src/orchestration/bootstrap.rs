//! # Worker Bootstrap
//!
//! Assembles everything a [`super::BuildWorker`] needs from configuration and
//! the external collaborators: the verified executor registry, the retry
//! manager, the validator and the progress tracker.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let collaborators = BuildCollaborators::new(pure_builder, oci_builder, detector, templates, hasher)
//!     .with_cache_pusher(attic);
//! let components = WorkerComponents::from_config(config.config(), collaborators)?;
//! let worker = Arc::new(BuildWorker::new(config.config().worker.clone(), store, queue, components));
//! worker.start_with_recovery().await?;
//! ```

use std::sync::Arc;

use crate::config::BuildkeeperConfig;
use crate::executors::{
    ArtifactBuilder, ArtifactBuilders, AutoStrategyExecutor, CachePusher, Detector,
    DockerfileStrategyExecutor, FlakeStrategyExecutor, HashCalculator, Language,
    NixpacksStrategyExecutor, TemplateEngine,
};
use crate::progress::{DefaultProgressTracker, ProgressTracker};
use crate::registry::{ExecutorRegistry, RegistryError};
use crate::retry::RetryManager;
use crate::validation::{BuildValidator, DefaultBuildValidator};

/// The external tools the build core drives
#[derive(Clone)]
pub struct BuildCollaborators {
    pub pure_builder: Arc<dyn ArtifactBuilder>,
    pub oci_builder: Arc<dyn ArtifactBuilder>,
    pub detector: Arc<dyn Detector>,
    pub templates: Arc<dyn TemplateEngine>,
    pub hasher: Arc<dyn HashCalculator>,
    /// Binary cache for legacy pure builds; pushing is skipped when absent
    pub cache_pusher: Option<Arc<dyn CachePusher>>,
}

impl BuildCollaborators {
    pub fn new(
        pure_builder: Arc<dyn ArtifactBuilder>,
        oci_builder: Arc<dyn ArtifactBuilder>,
        detector: Arc<dyn Detector>,
        templates: Arc<dyn TemplateEngine>,
        hasher: Arc<dyn HashCalculator>,
    ) -> Self {
        Self {
            pure_builder,
            oci_builder,
            detector,
            templates,
            hasher,
            cache_pusher: None,
        }
    }

    pub fn with_cache_pusher(mut self, cache_pusher: Arc<dyn CachePusher>) -> Self {
        self.cache_pusher = Some(cache_pusher);
        self
    }

    pub fn builders(&self) -> ArtifactBuilders {
        ArtifactBuilders::new(self.pure_builder.clone(), self.oci_builder.clone())
    }
}

/// Registry with the flake, four auto-language, dockerfile and nixpacks
/// executors. `auto` is left to the legacy dispatch.
pub fn default_registry(
    collaborators: &BuildCollaborators,
) -> Result<ExecutorRegistry, RegistryError> {
    let builders = collaborators.builders();
    let auto = |language: Language| {
        Arc::new(AutoStrategyExecutor::new(
            language,
            collaborators.detector.clone(),
            collaborators.templates.clone(),
            collaborators.hasher.clone(),
            builders.clone(),
        ))
    };

    ExecutorRegistry::builder()
        .register(Arc::new(FlakeStrategyExecutor::new(builders.clone())))
        .register(auto(Language::Go))
        .register(auto(Language::Node))
        .register(auto(Language::Rust))
        .register(auto(Language::Python))
        .register(Arc::new(DockerfileStrategyExecutor::new(
            collaborators.templates.clone(),
            builders.clone(),
        )))
        .register(Arc::new(NixpacksStrategyExecutor::new(builders.clone())))
        .build()
}

/// Injected parts of a worker. Start from [`WorkerComponents::from_config`]
/// and replace individual parts with the `with_*` methods.
#[derive(Clone)]
pub struct WorkerComponents {
    pub registry: Arc<ExecutorRegistry>,
    pub builders: ArtifactBuilders,
    pub cache_pusher: Option<Arc<dyn CachePusher>>,
    pub validator: Arc<dyn BuildValidator>,
    pub retry: Arc<RetryManager>,
    pub progress: Arc<dyn ProgressTracker>,
}

impl WorkerComponents {
    pub fn from_config(
        config: &BuildkeeperConfig,
        collaborators: BuildCollaborators,
    ) -> Result<Self, RegistryError> {
        let registry = default_registry(&collaborators)?;

        Ok(Self {
            registry: Arc::new(registry),
            builders: collaborators.builders(),
            cache_pusher: collaborators.cache_pusher,
            validator: Arc::new(DefaultBuildValidator::new()),
            retry: Arc::new(RetryManager::new(config.retry.to_strategy())),
            progress: Arc::new(DefaultProgressTracker::new()),
        })
    }

    pub fn with_registry(mut self, registry: ExecutorRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn BuildValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_retry_manager(mut self, retry: RetryManager) -> Self {
        self.retry = Arc::new(retry);
        self
    }

    pub fn with_progress_tracker(mut self, progress: Arc<dyn ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }
}

impl std::fmt::Debug for WorkerComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerComponents")
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .field("has_cache_pusher", &self.cache_pusher.is_some())
            .finish()
    }
}

//! Configuration Loader
//!
//! Environment-aware loading: defaults, then the base file, then the
//! environment-specific file, then `BUILDKEEPER_*` variables.

use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{BuildkeeperConfig, ConfigResult};

const CONFIG_FILE_STEM: &str = "buildkeeper";
const ENV_PREFIX: &str = "BUILDKEEPER";

pub struct ConfigManager {
    config: BuildkeeperConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with an explicit
    /// environment name, without consulting `BUILDKEEPER_ENV`
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let builder = Config::builder()
            .add_source(Config::try_from(&BuildkeeperConfig::default())?)
            .add_source(optional_file(&config_directory.join(CONFIG_FILE_STEM)))
            .add_source(optional_file(
                &config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}")),
            ));

        let config = Self::finish(builder)?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Load configuration from one explicit file (extension selects the format)
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        let builder = Config::builder()
            .add_source(Config::try_from(&BuildkeeperConfig::default())?)
            .add_source(File::from(path).required(true));

        let config = Self::finish(builder)?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: BuildkeeperConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: PathBuf::from("config"),
        }))
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> ConfigResult<BuildkeeperConfig> {
        let config: BuildkeeperConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        info!(
            concurrency = config.worker.concurrency,
            default_timeout_seconds = config.worker.default_timeout_seconds,
            max_attempts = config.retry.max_attempts,
            retry_as_oci = config.retry.retry_as_oci,
            "⚙️ Configuration loaded successfully"
        );

        Ok(config)
    }

    pub fn config(&self) -> &BuildkeeperConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn detect_environment() -> String {
        env::var("BUILDKEEPER_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("environment", &self.environment)
            .field("config_directory", &self.config_directory)
            .finish()
    }
}

fn optional_file(stem: &Path) -> File<config::FileSourceFile, config::FileFormat> {
    File::with_name(&stem.to_string_lossy()).required(false)
}

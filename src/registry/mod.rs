//! # Strategy Executor Registry
//!
//! Constructor-injected dispatch table from [`BuildStrategy`] to
//! [`StrategyExecutor`].
//!
//! ## Overview
//!
//! Lookup returns the first registered executor whose `supports` accepts the
//! strategy. The table is verified against [`REQUIRED_STRATEGIES`] when it is
//! built, so a missing executor fails worker construction instead of the
//! first job that needs it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = ExecutorRegistry::builder()
//!     .register(Arc::new(FlakeStrategyExecutor::new(builders.clone())))
//!     .register(Arc::new(AutoStrategyExecutor::new(Language::Go, detector, templates, hasher, builders)))
//!     // ...
//!     .build()?;
//!
//! let executor = registry.get_executor(BuildStrategy::Flake)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::executors::StrategyExecutor;
use crate::models::BuildStrategy;

/// Strategies that must have an executor for a registry to be built
pub const REQUIRED_STRATEGIES: [BuildStrategy; 5] = [
    BuildStrategy::Flake,
    BuildStrategy::AutoGo,
    BuildStrategy::AutoNode,
    BuildStrategy::AutoRust,
    BuildStrategy::AutoPython,
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no executor found for strategy: {strategy}")]
    NoExecutor { strategy: BuildStrategy },

    #[error("missing executors for required strategies: {}", format_strategies(.missing))]
    MissingRequiredExecutors { missing: Vec<BuildStrategy> },
}

fn format_strategies(strategies: &[BuildStrategy]) -> String {
    strategies
        .iter()
        .map(BuildStrategy::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collects executors in registration order
#[derive(Default)]
pub struct RegistryBuilder {
    executors: Vec<Arc<dyn StrategyExecutor>>,
}

impl RegistryBuilder {
    pub fn register(mut self, executor: Arc<dyn StrategyExecutor>) -> Self {
        debug!(executor = executor.name(), "Registering strategy executor");
        self.executors.push(executor);
        self
    }

    /// Verify the required strategies and freeze the table
    pub fn build(self) -> Result<ExecutorRegistry, RegistryError> {
        let registry = ExecutorRegistry {
            executors: self.executors,
        };
        registry.verify_required_executors()?;

        info!(
            executors = registry.executors.len(),
            strategies = %format_strategies(&registry.registered_strategies()),
            "📚 Strategy executor registry initialized"
        );
        Ok(registry)
    }
}

pub struct ExecutorRegistry {
    executors: Vec<Arc<dyn StrategyExecutor>>,
}

impl ExecutorRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get_executor(
        &self,
        strategy: BuildStrategy,
    ) -> Result<Arc<dyn StrategyExecutor>, RegistryError> {
        self.executors
            .iter()
            .find(|executor| executor.supports(strategy))
            .cloned()
            .ok_or(RegistryError::NoExecutor { strategy })
    }

    pub fn verify_required_executors(&self) -> Result<(), RegistryError> {
        let missing: Vec<_> = REQUIRED_STRATEGIES
            .into_iter()
            .filter(|strategy| self.get_executor(*strategy).is_err())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::MissingRequiredExecutors { missing })
        }
    }

    /// Every known strategy some registered executor supports, in
    /// registration order
    pub fn registered_strategies(&self) -> Vec<BuildStrategy> {
        let mut strategies = Vec::new();
        for executor in &self.executors {
            for strategy in BuildStrategy::ALL {
                if executor.supports(strategy) && !strategies.contains(&strategy) {
                    strategies.push(strategy);
                }
            }
        }
        strategies
    }

    pub fn verify_strategy_mapping(&self, strategy: BuildStrategy) -> Result<(), RegistryError> {
        self.get_executor(strategy).map(|_| ())
    }

    /// Mapping failures for every known strategy; an empty map means every
    /// strategy resolves
    pub fn verify_all_strategy_mappings(&self) -> BTreeMap<String, RegistryError> {
        BuildStrategy::ALL
            .into_iter()
            .filter_map(|strategy| {
                self.verify_strategy_mapping(strategy)
                    .err()
                    .map(|err| (strategy.as_str().to_string(), err))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field(
                "executors",
                &self.executors.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

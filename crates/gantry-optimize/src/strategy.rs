//! Optimization strategies
//!
//! One strategy per directive variant, registered explicitly at start-up into
//! an immutable registry. A strategy decides whether a task may be replaced by
//! a previously created execution and, if so, with which id.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use gantry_graph::{OptimizationDirective, Task};
use gantry_platform::{Index, Queue};

use crate::error::Result;

/// Kind whose caches reference container images; a failed prior build of an
/// image must not be reused
const IMAGE_KIND: &str = "docker-image";

/// Decides whether one task may be replaced by a prior execution
#[async_trait]
pub trait OptimizationStrategy: Send + Sync {
    /// The directive discriminant this strategy handles
    fn name(&self) -> &'static str;

    /// Id of a usable prior execution, or `None` to keep the task
    async fn replacement(
        &self,
        task: &Task,
        directive: &OptimizationDirective,
    ) -> Result<Option<String>>;
}

/// `always-run`: never replaced
pub struct AlwaysRunStrategy;

#[async_trait]
impl OptimizationStrategy for AlwaysRunStrategy {
    fn name(&self) -> &'static str {
        "always-run"
    }

    async fn replacement(
        &self,
        _task: &Task,
        _directive: &OptimizationDirective,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}

/// `index-search`: replace with a previously indexed execution when it is
/// found, unexpired, and (for container-image caches) did not fail
pub struct IndexSearchStrategy {
    index: Arc<dyn Index>,
    queue: Arc<dyn Queue>,
    index_prefix: String,
    now: DateTime<Utc>,
}

impl IndexSearchStrategy {
    /// Strategy resolving lookups against `index` under `index_prefix`
    pub fn new(
        index: Arc<dyn Index>,
        queue: Arc<dyn Queue>,
        index_prefix: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            index,
            queue,
            index_prefix: index_prefix.into(),
            now,
        }
    }
}

#[async_trait]
impl OptimizationStrategy for IndexSearchStrategy {
    fn name(&self) -> &'static str {
        "index-search"
    }

    async fn replacement(
        &self,
        task: &Task,
        directive: &OptimizationDirective,
    ) -> Result<Option<String>> {
        let Some(path) = directive.index_path(&self.index_prefix) else {
            return Ok(None);
        };

        let Some(entry) = self.index.find_task(&path).await? else {
            debug!(label = %task.label, path, "no index entry");
            return Ok(None);
        };
        if !entry.is_valid(self.now) {
            debug!(label = %task.label, path, "index entry expired");
            return Ok(None);
        }

        if task.kind == IMAGE_KIND {
            match self.queue.status(&entry.task_id).await? {
                Some(status) if status.state.is_broken() => {
                    debug!(label = %task.label, prior = %entry.task_id, "prior image build broken");
                    return Ok(None);
                }
                None => return Ok(None),
                Some(_) => {}
            }
        }

        Ok(Some(entry.task_id))
    }
}

/// Immutable registry of strategies, keyed by directive discriminant
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn OptimizationStrategy>>,
}

impl StrategyRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            strategies: BTreeMap::new(),
        }
    }

    /// Registry with the built-in strategies
    pub fn builtin(
        index: Arc<dyn Index>,
        queue: Arc<dyn Queue>,
        index_prefix: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(AlwaysRunStrategy));
        registry.register(Arc::new(IndexSearchStrategy::new(
            index,
            queue,
            index_prefix,
            now,
        )));
        registry
    }

    /// Register a strategy; later registrations under the same name win
    pub fn register(&mut self, strategy: Arc<dyn OptimizationStrategy>) {
        self.strategies
            .insert(strategy.name().to_string(), strategy);
    }

    /// Look up a strategy by directive discriminant
    pub fn get(&self, name: &str) -> Option<Arc<dyn OptimizationStrategy>> {
        self.strategies.get(name).cloned()
    }
}

/// Discriminant a directive dispatches on
pub(crate) fn directive_name(directive: &OptimizationDirective) -> &'static str {
    match directive {
        OptimizationDirective::AlwaysRun => "always-run",
        OptimizationDirective::IndexSearch { .. } => "index-search",
    }
}

//! Stage registry and pipeline composition
//!
//! Stages are registered explicitly during process start-up, producing an
//! immutable registry passed to all consumers; nothing is registered through
//! import-time side effects.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::TransformConfig;
use crate::error::TransformError;

/// One task-description record flowing through a pipeline
pub type Record = Value;

/// Lazy sequence of records; an `Err` item aborts collection downstream
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<Record, TransformError>> + 'a>;

/// A pure pipeline stage
pub trait Transform: Send + Sync {
    /// Stage name as referenced from kind configurations
    fn name(&self) -> &'static str;

    /// Transform a lazy record sequence into another lazy record sequence
    fn apply<'a>(&self, config: &'a TransformConfig, records: RecordStream<'a>)
        -> RecordStream<'a>;
}

/// Map a fallible per-record function over a stream, preserving laziness
pub fn map_records<'a, F>(records: RecordStream<'a>, mut f: F) -> RecordStream<'a>
where
    F: FnMut(Record) -> Result<Record, TransformError> + 'a,
{
    Box::new(records.map(move |record| record.and_then(&mut f)))
}

/// Immutable registry of transform stages
pub struct TransformRegistry {
    stages: BTreeMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            stages: BTreeMap::new(),
        }
    }

    /// Registry with the generic built-in stages
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(crate::task::Defaults));
        registry.register(Arc::new(crate::validate::Validate::for_task_descriptions()));
        registry.register(Arc::new(crate::task::ResolveKeyed));
        registry.register(Arc::new(crate::task::RunOnProjects));
        registry.register(Arc::new(crate::task::Display));
        registry.register(Arc::new(crate::task::Cached));
        registry
    }

    /// Register a stage; later registrations under the same name win
    pub fn register(&mut self, stage: Arc<dyn Transform>) {
        self.stages.insert(stage.name().to_string(), stage);
    }

    /// Look up a stage by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Transform>> {
        self.stages.get(name).cloned()
    }

    /// Registered stage names
    pub fn names(&self) -> Vec<&str> {
        self.stages.keys().map(String::as_str).collect()
    }

    /// Resolve a kind's ordered stage list up front, failing on unknown names
    pub fn pipeline(
        &self,
        kind: &str,
        names: &[String],
    ) -> Result<Vec<Arc<dyn Transform>>, TransformError> {
        names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| TransformError::UnknownStage {
                    kind: kind.to_string(),
                    stage: name.clone(),
                })
            })
            .collect()
    }
}

/// Thread a record stream through an ordered stage list
pub fn run_pipeline<'a>(
    stages: &[Arc<dyn Transform>],
    config: &'a TransformConfig,
    records: RecordStream<'a>,
) -> RecordStream<'a> {
    let mut stream = records;
    for stage in stages {
        debug!(kind = %config.kind, stage = stage.name(), "composing stage");
        stream = stage.apply(config, stream);
    }
    stream
}


#[cfg(test)]
mod tests {
    use super::test_support::test_config;
    use super::*;
    use serde_json::json;

    struct Upper;

    impl Transform for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn apply<'a>(
            &self,
            _config: &'a TransformConfig,
            records: RecordStream<'a>,
        ) -> RecordStream<'a> {
            map_records(records, |mut record| {
                let name = record["name"].as_str().unwrap_or("").to_uppercase();
                record["name"] = json!(name);
                Ok(record)
            })
        }
    }

    struct Explode;

    impl Transform for Explode {
        fn name(&self) -> &'static str {
            "explode"
        }

        fn apply<'a>(
            &self,
            _config: &'a TransformConfig,
            records: RecordStream<'a>,
        ) -> RecordStream<'a> {
            map_records(records, |record| {
                Err(TransformError::Invalid {
                    stage: "explode",
                    item: record["name"].as_str().unwrap_or("?").to_string(),
                    message: "boom".to_string(),
                })
            })
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = TransformRegistry::empty();
        registry.register(Arc::new(Upper));
        assert!(registry.get("upper").is_some());
        assert!(registry.get("lower").is_none());
    }

    #[test]
    fn test_unknown_stage_fails_pipeline_resolution() {
        let registry = TransformRegistry::empty();
        let result = registry.pipeline("build", &["missing".to_string()]);
        assert!(matches!(result, Err(TransformError::UnknownStage { .. })));
    }

    #[test]
    fn test_composition_order() {
        let config = test_config(Value::Null, json!({"a": {}}));
        let mut registry = TransformRegistry::empty();
        registry.register(Arc::new(Upper));
        let stages = registry.pipeline("build", &["upper".to_string()]).unwrap();

        let out: Vec<_> = run_pipeline(&stages, &config, config.initial_records())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(out[0]["name"], "A");
    }

    #[test]
    fn test_stages_are_lazy() {
        // Explode fails per record; with no records drained, nothing fails
        let config = test_config(Value::Null, json!({"a": {}, "b": {}}));
        let mut registry = TransformRegistry::empty();
        registry.register(Arc::new(Explode));
        let stages = registry.pipeline("build", &["explode".to_string()]).unwrap();

        let mut stream = run_pipeline(&stages, &config, config.initial_records());
        // first record fails fast without touching the second
        assert!(stream.next().unwrap().is_err());
    }
}

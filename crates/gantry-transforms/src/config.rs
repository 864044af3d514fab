//! Per-kind transform configuration

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use gantry_core::{GraphConfig, KindConfig, Parameters};
use gantry_graph::Task;

use crate::pipeline::{Record, RecordStream};
use crate::TransformError;

/// Immutable configuration threaded through one kind's pipeline.
///
/// Created once per kind per generation and never mutated; stages receive it
/// by shared reference.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Kind name
    pub kind: String,
    /// The kind's configuration (stanzas, defaults, stage list)
    pub config: KindConfig,
    /// Resolved run parameters
    pub params: Arc<Parameters>,
    /// Tasks already produced by upstream kinds, keyed by label
    pub kind_dependencies_tasks: BTreeMap<String, Task>,
    /// Graph-wide configuration
    pub graph_config: Arc<GraphConfig>,
    /// Whether intermediate artifacts should be persisted
    pub write_artifacts: bool,
}

impl TransformConfig {
    /// Build the configuration for one kind
    pub fn new(
        config: KindConfig,
        params: Arc<Parameters>,
        kind_dependencies_tasks: BTreeMap<String, Task>,
        graph_config: Arc<GraphConfig>,
        write_artifacts: bool,
    ) -> Self {
        Self {
            kind: config.name.clone(),
            config,
            params,
            kind_dependencies_tasks,
            graph_config,
            write_artifacts,
        }
    }

    /// The kind's named task stanzas as initial pipeline records, in
    /// declaration order. Each record gains a `name` field from its stanza key.
    pub fn initial_records(&self) -> RecordStream<'static> {
        let records: Vec<Result<Record, TransformError>> = self
            .config
            .tasks
            .as_object()
            .map(|stanzas| {
                stanzas
                    .iter()
                    .map(|(name, stanza)| {
                        let mut record = stanza.clone();
                        if let Some(object) = record.as_object_mut() {
                            object.insert("name".to_string(), Value::String(name.clone()));
                            Ok(record)
                        } else {
                            Err(TransformError::Invalid {
                                stage: "load",
                                item: name.clone(),
                                message: "task stanza must be a mapping".to_string(),
                            })
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Box::new(records.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::config::KIND_CONFIG_FILE;

    fn kind_config() -> KindConfig {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("build");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(
            dir.join(KIND_CONFIG_FILE),
            r#"
transforms: [defaults]
tasks:
  linux64/opt:
    description: linux build
  win64/opt:
    description: windows build
"#,
        )
        .unwrap();
        KindConfig::load(&dir).unwrap()
    }

    fn graph_config() -> Arc<GraphConfig> {
        Arc::new(GraphConfig {
            trusted_projects: vec!["integration".to_string()],
            index_prefix: "gantry.v2".to_string(),
            worker_aliases: BTreeMap::new(),
            runner_path: None,
            runner_hash: "feedface00".to_string(),
        })
    }

    fn params() -> Arc<Parameters> {
        Arc::new(
            Parameters::builder()
                .set("project", "integration")
                .set("repository", "https://example.com/repo")
                .set("pushid", 1)
                .set("push-date", 1_700_000_000)
                .set("head-rev", "abc")
                .set("head-ref", "main")
                .set("level", 3)
                .set("owner", "dev@example.com")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_initial_records_carry_names_in_order() {
        let config = TransformConfig::new(
            kind_config(),
            params(),
            BTreeMap::new(),
            graph_config(),
            false,
        );

        let records: Vec<_> = config
            .initial_records()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["name"], "linux64/opt");
        assert_eq!(records[1]["name"], "win64/opt");
    }
}

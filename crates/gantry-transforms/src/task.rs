//! Generic task transforms
//!
//! The built-in stages shared by every kind: defaults merging, keyed-value
//! resolution of well-known fields, project filtering, display metadata, and
//! cached-task digest computation. Worker payload lowering lives in
//! `gantry-workers` and registers its own stage.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use gantry_core::resolve_keyed_by;
use gantry_graph::{CacheDigest, OptimizationDirective, Task};

use crate::config::TransformConfig;
use crate::error::TransformError;
use crate::pipeline::{map_records, Record, RecordStream, Transform};

/// Fields whose values may be keyed-by structures in task stanzas
const KEYED_FIELDS: &[&str] = &[
    "worker-type",
    "worker",
    "tier",
    "run-on-projects",
    "expires-after",
    "routes",
    "scopes",
    "display",
];

/// Merge the kind's `task-defaults` under every record
pub struct Defaults;

impl Transform for Defaults {
    fn name(&self) -> &'static str {
        "defaults"
    }

    fn apply<'a>(
        &self,
        config: &'a TransformConfig,
        records: RecordStream<'a>,
    ) -> RecordStream<'a> {
        let defaults = config.config.task_defaults.clone();
        map_records(records, move |record| Ok(merge_under(&defaults, record)))
    }
}

/// Overlay `record` on `defaults`: objects merge recursively, the record wins
/// everywhere else
fn merge_under(defaults: &Value, record: Value) -> Value {
    match (defaults, record) {
        (Value::Object(defaults), Value::Object(mut record)) => {
            let mut merged = defaults.clone();
            for (key, value) in std::mem::take(&mut record) {
                let value = match merged.get(&key) {
                    Some(base) => merge_under(base, value),
                    None => value,
                };
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (_, record) => record,
    }
}

/// Resolve keyed-by structures in well-known record fields
pub struct ResolveKeyed;

impl Transform for ResolveKeyed {
    fn name(&self) -> &'static str {
        "resolve-keyed"
    }

    fn apply<'a>(
        &self,
        config: &'a TransformConfig,
        records: RecordStream<'a>,
    ) -> RecordStream<'a> {
        map_records(records, move |mut record| {
            let item_name = record_name(&record);
            let context = record_context(config, &record);

            for field in KEYED_FIELDS {
                if let Some(value) = record.get(*field) {
                    let resolved =
                        resolve_keyed_by(value, field, &item_name, &context, &[], true)?;
                    record[*field] = resolved;
                }
            }
            Ok(record)
        })
    }
}

/// Resolver context for one record: scalar run parameters plus the record's
/// own name, platform, and kind
fn record_context(config: &TransformConfig, record: &Record) -> BTreeMap<String, String> {
    let mut context = config.params.context();
    context.insert("kind".to_string(), config.kind.clone());
    context.insert("name".to_string(), record_name(record));
    if let Some(platform) = record.get("platform").and_then(Value::as_str) {
        context.insert("platform".to_string(), platform.to_string());
    }
    context
}

fn record_name(record: &Record) -> String {
    record
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>")
        .to_string()
}

/// Drop records whose `run-on-projects` excludes the current project
pub struct RunOnProjects;

impl Transform for RunOnProjects {
    fn name(&self) -> &'static str {
        "run-on-projects"
    }

    fn apply<'a>(
        &self,
        config: &'a TransformConfig,
        records: RecordStream<'a>,
    ) -> RecordStream<'a> {
        let project = config.params.project().to_string();
        Box::new(records.filter(move |record| match record {
            Ok(record) => match record.get("run-on-projects").and_then(Value::as_array) {
                Some(projects) => projects
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|p| p == "all" || p == project),
                None => true,
            },
            Err(_) => true,
        }))
    }
}

/// Fill display metadata, defaulting the display platform from the record
pub struct Display;

impl Transform for Display {
    fn name(&self) -> &'static str {
        "display"
    }

    fn apply<'a>(
        &self,
        _config: &'a TransformConfig,
        records: RecordStream<'a>,
    ) -> RecordStream<'a> {
        map_records(records, |mut record| {
            let platform = record
                .get("platform")
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(display) = record.get_mut("display").and_then(Value::as_object_mut) {
                if !display.contains_key("platform") {
                    if let Some(platform) = platform {
                        display.insert("platform".to_string(), Value::String(platform));
                    }
                }
            }
            Ok(record)
        })
    }
}

/// Compute cache digests for cached tasks and attach an index-search
/// optimization directive.
///
/// The digest is the record's declared digest data followed by the runner
/// content hash and, when the task runs in a container image, the image
/// reference, so changing either invalidates the cache without bookkeeping.
pub struct Cached;

impl Transform for Cached {
    fn name(&self) -> &'static str {
        "cached"
    }

    fn apply<'a>(
        &self,
        config: &'a TransformConfig,
        records: RecordStream<'a>,
    ) -> RecordStream<'a> {
        let kind = config.kind.clone();
        let runner_hash = config.graph_config.runner_hash.clone();
        map_records(records, move |mut record| {
            let Some(cache) = record.get("cache").cloned() else {
                return Ok(record);
            };

            let name = cache
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| TransformError::Invalid {
                    stage: "cached",
                    item: record_name(&record),
                    message: "cache stanza requires a 'name'".to_string(),
                })?
                .to_string();

            let mut data: Vec<String> = cache
                .get("digest-data")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            data.push(runner_hash.clone());
            if let Some(image) = record
                .get("worker")
                .and_then(|w| w.get("docker-image"))
                .and_then(Value::as_str)
            {
                data.push(image.to_string());
            }

            let directive = OptimizationDirective::IndexSearch {
                cache_name: format!("{kind}.{name}"),
                digest: CacheDigest::from_data(data),
            };
            record["optimization"] = serde_json::to_value(&directive).map_err(|e| {
                TransformError::Invalid {
                    stage: "cached",
                    item: record_name(&record),
                    message: e.to_string(),
                }
            })?;
            Ok(record)
        })
    }
}

/// Convert a fully transformed record into a graph [`Task`].
///
/// Expects the lowering stage to have produced the final `task` definition;
/// everything else on the record is structural metadata.
pub fn into_task(kind: &str, record: Record) -> Result<Task, TransformError> {
    let name = record_name(&record);
    let invalid = |message: String| TransformError::Invalid {
        stage: "into-task",
        item: name.clone(),
        message,
    };

    let label = record
        .get("label")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{kind}-{name}"));

    let definition = record
        .get("task")
        .cloned()
        .ok_or_else(|| invalid("record was never lowered: no 'task' definition".to_string()))?;
    if !definition.is_object() {
        return Err(invalid("'task' definition must be a mapping".to_string()));
    }

    let mut task = Task::new(label, kind, definition);

    if let Some(attributes) = record.get("attributes").and_then(Value::as_object) {
        for (key, value) in attributes {
            task.attributes.insert(key.clone(), value.clone());
        }
    }
    task.attributes
        .insert("kind".to_string(), json!(kind));
    if let Some(tier) = record.get("tier").and_then(Value::as_u64) {
        task.attributes.insert("tier".to_string(), json!(tier));
    }
    if let Some(signoffs) = record.get("required-signoffs") {
        task.attributes
            .insert("required-signoffs".to_string(), signoffs.clone());
    }

    if let Some(dependencies) = record.get("dependencies").and_then(Value::as_object) {
        for (dep_name, target) in dependencies {
            let target = target
                .as_str()
                .ok_or_else(|| invalid(format!("dependency '{dep_name}' must be a label")))?;
            task.dependencies
                .insert(dep_name.clone(), target.to_string());
        }
    }
    task.soft_dependencies = string_list(&record, "soft-dependencies");
    task.if_dependencies = string_list(&record, "if-dependencies");

    task.optimization = match record.get("optimization") {
        Some(value) => Some(
            serde_json::from_value(value.clone())
                .map_err(|e| invalid(format!("bad optimization directive: {e}")))?,
        ),
        None if record.get("always-run").and_then(Value::as_bool) == Some(true) => {
            Some(OptimizationDirective::AlwaysRun)
        }
        None => None,
    };

    Ok(task)
}

fn string_list(record: &Record, key: &str) -> Vec<String> {
    record
        .get(key)
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::test_config;

    fn collect(stage: &dyn Transform, config: &TransformConfig) -> Vec<Record> {
        stage
            .apply(config, config.initial_records())
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_defaults_merge_record_wins() {
        let config = test_config(
            json!({"worker-type": "b-linux", "worker": {"max-run-time": 3600}}),
            json!({"a": {"worker": {"max-run-time": 7200}}}),
        );
        let records = collect(&Defaults, &config);
        assert_eq!(records[0]["worker-type"], "b-linux");
        assert_eq!(records[0]["worker"]["max-run-time"], 7200);
    }

    #[test]
    fn test_resolve_keyed_uses_platform_context() {
        let config = test_config(
            Value::Null,
            json!({"a": {
                "platform": "linux64",
                "worker-type": {"by-platform": {"linux.*": "b-linux", "default": "b-misc"}},
            }}),
        );
        let records = collect(&ResolveKeyed, &config);
        assert_eq!(records[0]["worker-type"], "b-linux");
    }

    #[test]
    fn test_run_on_projects_filters() {
        let config = test_config(
            Value::Null,
            json!({
                "kept": {"run-on-projects": ["integration"]},
                "dropped": {"run-on-projects": ["release"]},
                "everywhere": {"run-on-projects": ["all"]},
                "unconstrained": {},
            }),
        );
        let records = collect(&RunOnProjects, &config);
        let names: Vec<_> = records
            .iter()
            .map(|r| r["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["kept", "everywhere", "unconstrained"]);
    }

    #[test]
    fn test_cached_attaches_index_search() {
        let config = test_config(
            Value::Null,
            json!({"clang": {
                "cache": {"name": "clang", "digest-data": ["linux64", "13.0"]},
                "worker": {"docker-image": "debian12:latest"},
            }}),
        );
        let records = collect(&Cached, &config);
        let optimization = &records[0]["optimization"];
        assert_eq!(optimization["strategy"], "index-search");
        assert_eq!(optimization["cache-name"], "build.clang");
        // digest data carries the inputs, the runner hash, and the image
        let data = optimization["digest"]["data"].as_array().unwrap();
        assert_eq!(data.len(), 4);
        assert_eq!(data[2], "feedface00");
        assert_eq!(data[3], "debian12:latest");
    }

    #[test]
    fn test_into_task_defaults_label() {
        let record = json!({
            "name": "linux64/opt",
            "task": {"payload": {}},
            "dependencies": {"toolchain": "toolchain-clang"},
            "tier": 2,
        });
        let task = into_task("build", record).unwrap();
        assert_eq!(task.label, "build-linux64/opt");
        assert_eq!(task.kind, "build");
        assert_eq!(task.tier(), 2);
        assert_eq!(task.attr_str("kind"), Some("build"));
        assert_eq!(
            task.dependencies.get("toolchain").map(String::as_str),
            Some("toolchain-clang")
        );
    }

    #[test]
    fn test_into_task_requires_lowered_definition() {
        let record = json!({"name": "x"});
        assert!(into_task("build", record).is_err());
    }

    #[test]
    fn test_into_task_always_run() {
        let record = json!({"name": "x", "task": {}, "always-run": true});
        let task = into_task("build", record).unwrap();
        assert_eq!(task.optimization, Some(OptimizationDirective::AlwaysRun));
    }
}

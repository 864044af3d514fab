//! The lowering pipeline stage
//!
//! Turns a fully transformed task description into the platform-ready task
//! definition: worker-type alias resolution, deterministic timestamps derived
//! from the push date, metadata, routes, scopes, and the implementation
//! payload from the builder registry. Once written, the definition is never
//! mutated; later passes build new task values instead.

use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

use gantry_transforms::{map_records, Record, RecordStream, Transform, TransformConfig, TransformError};

use crate::alias::resolve_worker_type;
use crate::error::LoweringError;
use crate::registry::PayloadRegistry;
use crate::scopes::CapabilityAccumulator;

/// How long a submitted task may wait before the platform must run it
const DEADLINE: &str = "1 day";

/// Default artifact retention per trust level
const EXPIRES_TRUSTED: &str = "1 year";
const EXPIRES_DEFAULT: &str = "28 days";

/// The `lower` pipeline stage
pub struct Lower {
    registry: Arc<PayloadRegistry>,
}

impl Lower {
    /// Lowering stage dispatching through `registry`
    pub fn new(registry: Arc<PayloadRegistry>) -> Self {
        Self { registry }
    }
}

impl Default for Lower {
    fn default() -> Self {
        Self::new(Arc::new(PayloadRegistry::builtin()))
    }
}

impl Transform for Lower {
    fn name(&self) -> &'static str {
        "lower"
    }

    fn apply<'a>(
        &self,
        config: &'a TransformConfig,
        records: RecordStream<'a>,
    ) -> RecordStream<'a> {
        let registry = self.registry.clone();
        map_records(records, move |record| {
            lower_record(&registry, config, record)
        })
    }
}

fn lower_record(
    registry: &PayloadRegistry,
    config: &TransformConfig,
    mut record: Record,
) -> Result<Record, TransformError> {
    let label = record
        .get("label")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            let name = record.get("name").and_then(Value::as_str).unwrap_or("");
            format!("{}-{}", config.kind, name)
        });
    let fail = |e: LoweringError| TransformError::Invalid {
        stage: "lower",
        item: label.clone(),
        message: e.to_string(),
    };

    let alias = record
        .get("worker-type")
        .and_then(Value::as_str)
        .ok_or_else(|| TransformError::Invalid {
            stage: "lower",
            item: label.clone(),
            message: "record has no 'worker-type'".to_string(),
        })?;
    let target =
        resolve_worker_type(alias, &label, &config.graph_config, &config.params).map_err(&fail)?;
    debug!(label = %label, provisioner = %target.provisioner, pool = %target.pool, "lowering");

    // All timestamps derive from the push date so regeneration from identical
    // inputs yields byte-identical definitions.
    let created = Utc
        .timestamp_opt(config.params.push_date(), 0)
        .single()
        .ok_or_else(|| TransformError::Invalid {
            stage: "lower",
            item: label.clone(),
            message: "push-date is out of range".to_string(),
        })?;
    let expires_after = record
        .get("expires-after")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| default_expiry(config).to_string());
    let deadline = created + parse_timespan(DEADLINE, &label)?;
    let expires = created + parse_timespan(&expires_after, &label)?;

    let mut accum = CapabilityAccumulator::new();
    for scope in string_list(&record, "scopes") {
        accum.add_scope(scope);
    }
    let payload = registry
        .lower_payload(config, &label, &record, &mut accum)
        .map_err(&fail)?;

    let mut definition = Map::new();
    definition.insert("provisioner-id".to_string(), json!(target.provisioner));
    definition.insert("worker-type".to_string(), json!(target.pool));
    definition.insert("created".to_string(), json!(stamp(created)));
    definition.insert("deadline".to_string(), json!(stamp(deadline)));
    definition.insert("expires".to_string(), json!(stamp(expires)));
    definition.insert(
        "metadata".to_string(),
        json!({
            "name": label,
            "description": record.get("description").and_then(Value::as_str).unwrap_or(""),
            "owner": config.params.owner(),
            "source": format!(
                "{}/rev/{}",
                config.params.repository(),
                config.params.head_rev()
            ),
        }),
    );
    definition.insert("routes".to_string(), json!(string_list(&record, "routes")));
    definition.insert("scopes".to_string(), json!(accum.scopes()));
    definition.insert("payload".to_string(), payload);

    let mut extra = Map::new();
    if let Some(display) = record.get("display").filter(|d| d.is_object()) {
        extra.insert("display".to_string(), display.clone());
    }
    if !extra.is_empty() {
        definition.insert("extra".to_string(), Value::Object(extra));
    }

    if record
        .get("worker")
        .and_then(|w| w.get("uses-runner"))
        .and_then(Value::as_bool)
        == Some(true)
    {
        if record.get("attributes").and_then(Value::as_object).is_none() {
            record["attributes"] = json!({});
        }
        record["attributes"]["uses-runner"] = json!(true);
    }

    record["label"] = json!(label);
    record["task"] = Value::Object(definition);
    Ok(record)
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

fn default_expiry(config: &TransformConfig) -> &'static str {
    if config.params.level() >= 3 {
        EXPIRES_TRUSTED
    } else {
        EXPIRES_DEFAULT
    }
}

fn stamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a human-readable timespan such as "28 days" or "1 year"
fn parse_timespan(spec: &str, label: &str) -> Result<Duration, TransformError> {
    let invalid = || TransformError::Invalid {
        stage: "lower",
        item: label.to_string(),
        message: format!("cannot parse timespan '{spec}'"),
    };

    let mut parts = spec.split_whitespace();
    let amount: i64 = parts
        .next()
        .and_then(|n| n.parse().ok())
        .ok_or_else(invalid)?;
    let unit = parts.next().ok_or_else(invalid)?;
    if parts.next().is_some() {
        return Err(invalid());
    }

    match unit.trim_end_matches('s') {
        "second" => Ok(Duration::seconds(amount)),
        "minute" => Ok(Duration::minutes(amount)),
        "hour" => Ok(Duration::hours(amount)),
        "day" => Ok(Duration::days(amount)),
        "month" => Ok(Duration::days(30 * amount)),
        "year" => Ok(Duration::days(365 * amount)),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use gantry_core::{GraphConfig, KindConfig, Parameters};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    /// A TransformConfig with a resolvable worker alias, shared by this
    /// crate's test modules
    pub(crate) fn lowering_config(tasks: Value) -> TransformConfig {
        let kind_config = KindConfig {
            name: "build".to_string(),
            path: PathBuf::from("kinds/build"),
            transforms: vec!["lower".to_string()],
            kind_dependencies: Vec::new(),
            task_defaults: Value::Null,
            tasks,
        };
        let params = Parameters::builder()
            .set("project", "integration")
            .set("repository", "https://example.com/repo")
            .set("pushid", 41)
            .set("push-date", 1_700_000_000)
            .set("head-rev", "abcdef123456")
            .set("head-ref", "main")
            .set("level", 3)
            .set("owner", "dev@example.com")
            .build()
            .unwrap();
        let mut aliases = BTreeMap::new();
        aliases.insert(
            "b-linux".to_string(),
            json!({"provisioner": "gantry-prov", "worker-pool": "b-linux-xlarge"}),
        );
        let graph_config = GraphConfig {
            trusted_projects: vec!["integration".to_string()],
            index_prefix: "gantry.v2".to_string(),
            worker_aliases: aliases,
            runner_path: None,
            runner_hash: "feedface0011223344".to_string(),
        };
        TransformConfig::new(
            kind_config,
            Arc::new(params),
            BTreeMap::new(),
            Arc::new(graph_config),
            false,
        )
    }

    fn docker_record() -> Value {
        json!({
            "name": "linux64/opt",
            "description": "linux build",
            "worker-type": "b-linux",
            "scopes": ["secrets:get:project/gantry/build"],
            "routes": ["index.gantry.v2.latest.build.linux64-opt"],
            "display": {"platform": "linux64/opt", "group": "B", "symbol": "B"},
            "worker": {
                "implementation": "docker",
                "docker-image": "debian12:latest",
                "command": ["./build.sh"],
                "uses-runner": true,
                "caches": [{"name": "gantry-run-workspace", "mount-point": "/builds/worker"}],
            },
        })
    }

    fn lower(record: Value) -> Record {
        let config = lowering_config(json!({}));
        lower_record(&PayloadRegistry::builtin(), &config, record).unwrap()
    }

    #[test]
    fn test_lowered_definition_shape() {
        let record = lower(docker_record());

        assert_eq!(record["label"], "build-linux64/opt");
        let task = &record["task"];
        assert_eq!(task["provisioner-id"], "gantry-prov");
        assert_eq!(task["worker-type"], "b-linux-xlarge");
        assert_eq!(task["metadata"]["owner"], "dev@example.com");
        assert_eq!(
            task["metadata"]["source"],
            "https://example.com/repo/rev/abcdef123456"
        );
        assert_eq!(task["extra"]["display"]["symbol"], "B");
        // cache scope and declared scope merge, sorted
        let scopes: Vec<_> = task["scopes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s.as_str().unwrap())
            .collect();
        assert_eq!(
            scopes,
            vec![
                "cache:gantry-run-workspace-feedface",
                "secrets:get:project/gantry/build",
            ]
        );
    }

    #[test]
    fn test_timestamps_derive_from_push_date() {
        let record = lower(docker_record());
        let task = &record["task"];
        assert_eq!(task["created"], "2023-11-14T22:13:20.000Z");
        assert_eq!(task["deadline"], "2023-11-15T22:13:20.000Z");
        // level 3 retains artifacts for a year
        assert_eq!(task["expires"], "2024-11-13T22:13:20.000Z");
    }

    #[test]
    fn test_runner_usage_becomes_attribute() {
        let record = lower(docker_record());
        assert_eq!(record["attributes"]["uses-runner"], true);
    }

    #[test]
    fn test_lowering_is_deterministic() {
        let a = serde_json::to_string(&lower(docker_record())).unwrap();
        let b = serde_json::to_string(&lower(docker_record())).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_worker_type_fails() {
        let config = lowering_config(json!({}));
        let record = json!({"name": "x", "worker": {"implementation": "docker", "docker-image": "i"}});
        let err = lower_record(&PayloadRegistry::builtin(), &config, record).unwrap_err();
        assert!(matches!(err, TransformError::Invalid { stage: "lower", .. }));
    }

    #[test]
    fn test_parse_timespan() {
        assert_eq!(parse_timespan("90 seconds", "t").unwrap(), Duration::seconds(90));
        assert_eq!(parse_timespan("4 hours", "t").unwrap(), Duration::hours(4));
        assert_eq!(parse_timespan("28 days", "t").unwrap(), Duration::days(28));
        assert_eq!(parse_timespan("1 year", "t").unwrap(), Duration::days(365));
        assert!(parse_timespan("fortnight", "t").is_err());
    }
}

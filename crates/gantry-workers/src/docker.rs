//! Container-image worker payloads

use serde_json::{json, Map, Value};

use gantry_core::{FieldType, Schema};
use gantry_graph::{RUN_CACHE_PREFIX, VCS_CACHE_PREFIX};
use gantry_transforms::{Record, TransformConfig};

use crate::error::LoweringError;
use crate::registry::PayloadBuilder;
use crate::scopes::{CacheMount, CapabilityAccumulator};

/// Payload builder for tasks executing inside a container image
pub struct DockerPayload;

impl PayloadBuilder for DockerPayload {
    fn implementation(&self) -> &'static str {
        "docker"
    }

    fn schema(&self) -> Schema {
        Schema::new("docker-worker")
            .required("implementation", FieldType::String)
            .required("docker-image", FieldType::Any)
            .optional("command", FieldType::Array)
            .optional("env", FieldType::Object)
            .optional("max-run-time", FieldType::Integer)
            .optional("caches", FieldType::Array)
            .optional("volumes", FieldType::Array)
            .optional("artifacts", FieldType::Array)
            .optional("privileged", FieldType::Boolean)
            .optional("chain-of-trust", FieldType::Boolean)
            .optional("uses-runner", FieldType::Boolean)
    }

    fn build(
        &self,
        config: &TransformConfig,
        record: &Record,
        worker: &Value,
        accum: &mut CapabilityAccumulator,
    ) -> Result<Value, LoweringError> {
        let label = record_label(record);
        let mut payload = Map::new();

        payload.insert("image".to_string(), worker["docker-image"].clone());
        if let Some(command) = worker.get("command") {
            payload.insert("command".to_string(), command.clone());
        }
        if let Some(env) = worker.get("env") {
            payload.insert("env".to_string(), env.clone());
        }
        payload.insert(
            "max-run-time".to_string(),
            worker
                .get("max-run-time")
                .cloned()
                .unwrap_or_else(|| json!(3600)),
        );

        // Reserved cache families embed the runner content hash so that a new
        // runner invalidates every dependent cache without bookkeeping.
        let hash = &config.graph_config.runner_hash;
        let hash_tag = &hash[..8.min(hash.len())];
        let mut volumes: Vec<String> = string_array(worker.get("volumes"));
        for cache in cache_entries(worker, &label)? {
            let name = if cache.name.starts_with(RUN_CACHE_PREFIX)
                || cache.name.starts_with(VCS_CACHE_PREFIX)
            {
                format!("{}-{}", cache.name, hash_tag)
            } else {
                cache.name
            };
            if !volumes.contains(&cache.mount_point) {
                volumes.push(cache.mount_point.clone());
            }
            accum.add_cache(CacheMount {
                name,
                mount_point: cache.mount_point,
            });
        }
        if !accum.caches().is_empty() {
            payload.insert("caches".to_string(), Value::Array(accum.caches_json()));
        }
        if !volumes.is_empty() {
            volumes.sort();
            payload.insert("volumes".to_string(), json!(volumes));
        }

        if let Some(artifacts) = worker.get("artifacts").and_then(Value::as_array) {
            let mut out = Map::new();
            for artifact in artifacts {
                let name = artifact
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| LoweringError::Invalid {
                        label: label.clone(),
                        message: "artifact entry lacks a 'name'".to_string(),
                    })?;
                out.insert(
                    name.to_string(),
                    json!({
                        "type": artifact.get("type").cloned().unwrap_or_else(|| json!("file")),
                        "path": artifact.get("path").cloned().unwrap_or(Value::Null),
                    }),
                );
            }
            payload.insert("artifacts".to_string(), Value::Object(out));
        }

        let mut features = Map::new();
        if worker.get("privileged").and_then(Value::as_bool) == Some(true) {
            accum.add_scope("worker:capability:privileged");
            features.insert("privileged".to_string(), json!(true));
        }
        if worker.get("chain-of-trust").and_then(Value::as_bool) == Some(true) {
            features.insert("chain-of-trust".to_string(), json!(true));
        }
        if !features.is_empty() {
            payload.insert("features".to_string(), Value::Object(features));
        }

        Ok(Value::Object(payload))
    }
}

fn record_label(record: &Record) -> String {
    record
        .get("label")
        .or_else(|| record.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>")
        .to_string()
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn cache_entries(worker: &Value, label: &str) -> Result<Vec<CacheMount>, LoweringError> {
    let Some(caches) = worker.get("caches").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    caches
        .iter()
        .map(|cache| {
            let name = cache.get("name").and_then(Value::as_str);
            let mount = cache.get("mount-point").and_then(Value::as_str);
            match (name, mount) {
                (Some(name), Some(mount)) => Ok(CacheMount {
                    name: name.to_string(),
                    mount_point: mount.to_string(),
                }),
                _ => Err(LoweringError::Invalid {
                    label: label.to_string(),
                    message: "cache entry requires 'name' and 'mount-point'".to_string(),
                }),
            }
        })
        .collect()
}

//! Host-level (non-containerized) worker payloads

use serde_json::{json, Map, Value};

use gantry_core::{FieldType, Schema};
use gantry_transforms::{Record, TransformConfig};

use crate::error::LoweringError;
use crate::registry::PayloadBuilder;
use crate::scopes::CapabilityAccumulator;

/// Payload builder for tasks running directly on a provisioned host
pub struct GenericPayload;

impl PayloadBuilder for GenericPayload {
    fn implementation(&self) -> &'static str {
        "generic"
    }

    fn schema(&self) -> Schema {
        Schema::new("generic-worker")
            .required("implementation", FieldType::String)
            .required("command", FieldType::Array)
            .optional("env", FieldType::Object)
            .optional("max-run-time", FieldType::Integer)
            .optional("mounts", FieldType::Array)
            .optional("artifacts", FieldType::Array)
            .optional("os-groups", FieldType::Array)
            .optional("chain-of-trust", FieldType::Boolean)
    }

    fn build(
        &self,
        _config: &TransformConfig,
        _record: &Record,
        worker: &Value,
        accum: &mut CapabilityAccumulator,
    ) -> Result<Value, LoweringError> {
        let mut payload = Map::new();

        payload.insert("command".to_string(), worker["command"].clone());
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
        if let Some(mounts) = worker.get("mounts") {
            payload.insert("mounts".to_string(), mounts.clone());
        }
        if let Some(artifacts) = worker.get("artifacts") {
            payload.insert("artifacts".to_string(), artifacts.clone());
        }

        if let Some(groups) = worker.get("os-groups").and_then(Value::as_array) {
            for group in groups.iter().filter_map(Value::as_str) {
                accum.add_scope(format!("worker:os-group:{group}"));
            }
            payload.insert("os-groups".to_string(), json!(groups));
        }

        if worker.get("chain-of-trust").and_then(Value::as_bool) == Some(true) {
            payload.insert(
                "features".to_string(),
                json!({"chain-of-trust": true}),
            );
        }

        Ok(Value::Object(payload))
    }
}

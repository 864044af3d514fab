//! Trusted script worker payloads
//!
//! Script workers run a named, pre-deployed script (signing, publishing) on a
//! locked-down pool; the payload names the script and its upstream inputs, and
//! access is gated by a per-script scope.

use serde_json::{Map, Value};

use gantry_core::{FieldType, Schema};
use gantry_transforms::{Record, TransformConfig};

use crate::error::LoweringError;
use crate::registry::PayloadBuilder;
use crate::scopes::CapabilityAccumulator;

/// Payload builder for trusted script workers
pub struct ScriptPayload;

impl PayloadBuilder for ScriptPayload {
    fn implementation(&self) -> &'static str {
        "script"
    }

    fn schema(&self) -> Schema {
        Schema::new("script-worker")
            .required("implementation", FieldType::String)
            .required("script", FieldType::String)
            .optional("args", FieldType::Array)
            .optional("upstream-artifacts", FieldType::Array)
            .optional("max-run-time", FieldType::Integer)
    }

    fn build(
        &self,
        _config: &TransformConfig,
        _record: &Record,
        worker: &Value,
        accum: &mut CapabilityAccumulator,
    ) -> Result<Value, LoweringError> {
        let mut payload = Map::new();

        let script = worker["script"].as_str().unwrap_or_default();
        accum.add_scope(format!("project:gantry:script:{script}"));

        payload.insert("script".to_string(), worker["script"].clone());
        if let Some(args) = worker.get("args") {
            payload.insert("args".to_string(), args.clone());
        }
        if let Some(upstream) = worker.get("upstream-artifacts") {
            payload.insert("upstream-artifacts".to_string(), upstream.clone());
        }
        if let Some(time) = worker.get("max-run-time") {
            payload.insert("max-run-time".to_string(), time.clone());
        }

        Ok(Value::Object(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_script_access_scope() {
        let config = crate::lower::tests::lowering_config(json!({}));
        let record = json!({"label": "sign-linux64", "worker": {
            "implementation": "script",
            "script": "sign",
            "upstream-artifacts": [{"task": "build-linux64/opt", "paths": ["public/build/target.tar.zst"]}],
        }});

        let mut accum = CapabilityAccumulator::new();
        let payload = ScriptPayload
            .build(&config, &record, &record["worker"], &mut accum)
            .unwrap();

        assert_eq!(payload["script"], "sign");
        assert_eq!(accum.scopes(), vec!["project:gantry:script:sign".to_string()]);
    }

    #[test]
    fn test_script_name_required() {
        let worker = json!({"implementation": "script"});
        assert!(ScriptPayload.schema().validate(&worker, "t").is_err());
    }
}

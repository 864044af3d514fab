//! Worker payload builder registry
//!
//! Dispatch from the worker-implementation discriminant to a (schema, builder)
//! pair. The registry is assembled once at start-up and passed explicitly to
//! the lowering stage; no builder is registered through side effects.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use gantry_core::Schema;
use gantry_transforms::{Record, TransformConfig};

use crate::error::LoweringError;
use crate::scopes::CapabilityAccumulator;

/// Builds the implementation-specific execution payload for one worker family
pub trait PayloadBuilder: Send + Sync {
    /// The discriminant this builder handles (the `worker.implementation` value)
    fn implementation(&self) -> &'static str;

    /// Schema the worker stanza must satisfy before building
    fn schema(&self) -> Schema;

    /// Produce the execution payload from a validated worker stanza.
    ///
    /// Builders append any scopes and cache mounts their features require to
    /// `accum`; the lowering stage drains it into the task definition.
    fn build(
        &self,
        config: &TransformConfig,
        record: &Record,
        worker: &Value,
        accum: &mut CapabilityAccumulator,
    ) -> Result<Value, LoweringError>;
}

/// Immutable registry of payload builders, keyed by implementation name
pub struct PayloadRegistry {
    builders: BTreeMap<String, Arc<dyn PayloadBuilder>>,
}

impl PayloadRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// Registry with the built-in worker families
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(crate::docker::DockerPayload));
        registry.register(Arc::new(crate::generic::GenericPayload));
        registry.register(Arc::new(crate::script::ScriptPayload));
        registry
    }

    /// Register a builder; later registrations under the same name win
    pub fn register(&mut self, builder: Arc<dyn PayloadBuilder>) {
        self.builders
            .insert(builder.implementation().to_string(), builder);
    }

    /// Look up a builder by implementation name
    pub fn get(&self, implementation: &str) -> Option<Arc<dyn PayloadBuilder>> {
        self.builders.get(implementation).cloned()
    }

    /// Registered implementation names
    pub fn implementations(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }

    /// Validate the record's worker stanza and build its payload
    pub fn lower_payload(
        &self,
        config: &TransformConfig,
        label: &str,
        record: &Record,
        accum: &mut CapabilityAccumulator,
    ) -> Result<Value, LoweringError> {
        let worker = record
            .get("worker")
            .filter(|w| w.is_object())
            .ok_or_else(|| LoweringError::Invalid {
                label: label.to_string(),
                message: "record has no 'worker' stanza".to_string(),
            })?;

        let implementation = worker
            .get("implementation")
            .and_then(Value::as_str)
            .ok_or_else(|| LoweringError::Invalid {
                label: label.to_string(),
                message: "worker stanza lacks an 'implementation'".to_string(),
            })?;

        let builder =
            self.get(implementation)
                .ok_or_else(|| LoweringError::UnknownImplementation {
                    label: label.to_string(),
                    implementation: implementation.to_string(),
                })?;

        builder.schema().validate(worker, label)?;
        builder.build(config, record, worker, accum)
    }
}

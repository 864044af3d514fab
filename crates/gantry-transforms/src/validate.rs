//! Generic schema-validation stage
//!
//! Can be inserted at any pipeline position. Each record is checked against a
//! declared schema; a failing record raises one error carrying every violation
//! found, identified by the record's label, name, or primary dependency.

use serde_json::Value;

use gantry_core::{FieldType, Schema};

use crate::config::TransformConfig;
use crate::pipeline::{map_records, Record, RecordStream, Transform};

/// Schema-validation stage
pub struct Validate {
    schema: Schema,
}

impl Validate {
    /// Validate against an arbitrary schema
    pub fn with_schema(schema: Schema) -> Self {
        Self { schema }
    }

    /// Validate the generic task-description shape produced by the built-in
    /// stages before lowering
    pub fn for_task_descriptions() -> Self {
        Self::with_schema(
            Schema::new("task-description")
                .required("name", FieldType::String)
                .required("description", FieldType::String)
                .optional("label", FieldType::String)
                .optional("attributes", FieldType::Object)
                .optional("dependencies", FieldType::Object)
                .optional("soft-dependencies", FieldType::Array)
                .optional("if-dependencies", FieldType::Array)
                .optional("worker-type", FieldType::String)
                .optional("worker", FieldType::Object)
                .optional("run-on-projects", FieldType::Array)
                .optional("routes", FieldType::Array)
                .optional("scopes", FieldType::Array)
                .optional("expires-after", FieldType::String)
                .optional("deadline-after", FieldType::String)
                .optional("display", FieldType::Object)
                .optional("cache", FieldType::Object)
                .optional("tier", FieldType::Integer)
                .optional("required-signoffs", FieldType::Array)
                .optional("always-run", FieldType::Boolean),
        )
    }

    fn ident(record: &Record) -> String {
        for key in ["label", "name"] {
            if let Some(ident) = record.get(key).and_then(Value::as_str) {
                return ident.to_string();
            }
        }
        // fall back to the primary dependency
        record
            .get("dependencies")
            .and_then(Value::as_object)
            .and_then(|deps| deps.values().next())
            .and_then(Value::as_str)
            .map(|dep| format!("<dependent of {dep}>"))
            .unwrap_or_else(|| "<unnamed record>".to_string())
    }
}

impl Transform for Validate {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn apply<'a>(
        &self,
        _config: &'a TransformConfig,
        records: RecordStream<'a>,
    ) -> RecordStream<'a> {
        let schema = self.schema.clone();
        map_records(records, move |record| {
            schema.validate(&record, &Self::ident(&record))?;
            Ok(record)
        })
    }
}

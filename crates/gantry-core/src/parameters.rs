//! Run parameters
//!
//! A frozen key→value store describing one graph generation: project, push id,
//! revision, trust level, branch, and the knobs that steer target selection and
//! optimization. Read-only for the whole pipeline.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use tracing::info;

use crate::error::{ConfigError, CoreError, Result};
use crate::schema::{FieldType, Schema};

/// Frozen parameters for one generation run
#[derive(Debug, Clone)]
pub struct Parameters {
    values: BTreeMap<String, Value>,
}

impl Parameters {
    /// Start building a parameter set
    pub fn builder() -> ParametersBuilder {
        ParametersBuilder::default()
    }

    /// Load parameters from a YAML file and validate them
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "loading parameters");
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.to_path_buf()))?;
        let values: BTreeMap<String, Value> =
            serde_yaml::from_str(&content).map_err(ConfigError::Yaml)?;
        let params = Self { values };
        params.check()?;
        Ok(params)
    }

    /// Validate that all required parameters are present and typed correctly
    pub fn check(&self) -> Result<()> {
        let value = Value::Object(self.values.clone().into_iter().collect());
        schema()
            .validate(&value, "parameters")
            .map_err(CoreError::Schema)
    }

    /// Raw access to a parameter value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Project (repository short name) this push belongs to
    pub fn project(&self) -> &str {
        self.str_or_empty("project")
    }

    /// Repository URL
    pub fn repository(&self) -> &str {
        self.str_or_empty("repository")
    }

    /// Push sequence number
    pub fn push_id(&self) -> u64 {
        self.values
            .get("pushid")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// Push timestamp, seconds since the epoch
    pub fn push_date(&self) -> i64 {
        self.values
            .get("push-date")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    /// Revision being built
    pub fn head_rev(&self) -> &str {
        self.str_or_empty("head-rev")
    }

    /// Branch/ref being built
    pub fn head_ref(&self) -> &str {
        self.str_or_empty("head-ref")
    }

    /// Push owner (email)
    pub fn owner(&self) -> &str {
        self.str_or_empty("owner")
    }

    /// Trust level of the repository (1 = least trusted, 3 = release)
    pub fn level(&self) -> u64 {
        self.values.get("level").and_then(Value::as_u64).unwrap_or(1)
    }

    /// Whether this run was explicitly forced to be a backstop
    pub fn force_backstop(&self) -> bool {
        self.values
            .get("backstop")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether non-explicit target tasks may be optimized away.
    ///
    /// Explicitly enumerated labels never are; disabling this extends that
    /// pinning to the entire selected target set.
    pub fn optimize_target_tasks(&self) -> bool {
        self.values
            .get("optimize-target-tasks")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Explicitly requested labels, empty when selection is attribute-driven
    pub fn target_labels(&self) -> Vec<String> {
        self.string_list("target-labels")
    }

    /// Task ids of earlier action/cron sub-runs whose label→task-id artifacts
    /// overlay this run's map
    pub fn overlay_task_ids(&self) -> Vec<String> {
        self.string_list("overlay-task-ids")
    }

    /// The full parameter map as JSON, for artifact persistence
    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone().into_iter().collect())
    }

    /// Context for the keyed-value resolver: every scalar parameter as a string
    pub fn context(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .filter_map(|(k, v)| scalar_string(v).map(|s| (k.clone(), s)))
            .collect()
    }

    fn str_or_empty(&self, key: &str) -> &str {
        self.values.get(key).and_then(Value::as_str).unwrap_or("")
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        self.values
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
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn schema() -> Schema {
    Schema::new("parameters")
        .required("project", FieldType::String)
        .required("repository", FieldType::String)
        .required("pushid", FieldType::Integer)
        .required("push-date", FieldType::Integer)
        .required("head-rev", FieldType::String)
        .required("head-ref", FieldType::String)
        .required("level", FieldType::Integer)
        .required("owner", FieldType::String)
        .optional("backstop", FieldType::Boolean)
        .optional("optimize-target-tasks", FieldType::Boolean)
        .optional("target-labels", FieldType::Array)
        .optional("overlay-task-ids", FieldType::Array)
        .allow_extra()
}

/// Builder for [`Parameters`]; the only way to construct them in-process
#[derive(Debug, Default)]
pub struct ParametersBuilder {
    values: BTreeMap<String, Value>,
}

impl ParametersBuilder {
    /// Set one parameter
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Freeze the parameter set, validating required keys
    pub fn build(self) -> Result<Parameters> {
        let params = Parameters {
            values: self.values,
        };
        params.check()?;
        Ok(params)
    }
}

#[doc(hidden)]
pub mod test_support {
    use super::*;
    use serde_json::json;

    /// A parameter set that passes `check()`, for use across the workspace's tests
    pub fn test_parameters() -> Parameters {
        Parameters::builder()
            .set("project", "integration")
            .set("repository", "https://example.com/repo")
            .set("pushid", 41)
            .set("push-date", 1_700_000_000)
            .set("head-rev", "abcdef123456")
            .set("head-ref", "main")
            .set("level", 3)
            .set("owner", "dev@example.com")
            .set("target-labels", json!([]))
            .build()
            .expect("test parameters are valid")
    }
}

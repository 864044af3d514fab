//! Task types

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::digest::CacheDigest;

/// Platform limit on a task's dependency fan-in. Exceeding it is a graph-build
/// error, never a runtime error.
pub const MAX_DEPENDENCIES: usize = 100;

/// How a task may be skipped or replaced during the optimization pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum OptimizationDirective {
    /// Never optimize this task away
    AlwaysRun,
    /// Replace with a previously indexed execution when found and unexpired
    IndexSearch {
        /// Content-addressed cache name
        #[serde(rename = "cache-name")]
        cache_name: String,
        /// Digest forming the cache identity
        digest: CacheDigest,
    },
}

impl OptimizationDirective {
    /// Deterministic index path for an `IndexSearch` lookup
    pub fn index_path(&self, prefix: &str) -> Option<String> {
        match self {
            Self::AlwaysRun => None,
            Self::IndexSearch { cache_name, digest } => {
                Some(format!("{prefix}.cache.{cache_name}.hash.{}", digest.hash()))
            }
        }
    }
}

/// One node of the task graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Globally unique, stable label within one graph generation
    pub label: String,

    /// Name of the transform family that produced this task
    pub kind: String,

    /// Ordered attributes used for filtering, dependency classification, and
    /// verification (shipping phase, tier, required sign-offs, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,

    /// Dependency name → label of the depended-on task
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Labels this task prefers to run after but which do not force creation
    #[serde(default, rename = "soft-dependencies")]
    pub soft_dependencies: Vec<String>,

    /// Labels participating in conditional execution only
    #[serde(default, rename = "if-dependencies")]
    pub if_dependencies: Vec<String>,

    /// Final lowered, platform-ready payload. Immutable once produced;
    /// later stages build new Task values instead of mutating it.
    pub task: Value,

    /// Optional directive describing how this node may be skipped or replaced
    #[serde(default)]
    pub optimization: Option<OptimizationDirective>,

    /// Execution id, assigned by the platform once submitted
    #[serde(default, rename = "task-id")]
    pub task_id: Option<String>,
}

impl Task {
    /// Create a task with an empty attribute and dependency set
    pub fn new(label: impl Into<String>, kind: impl Into<String>, task: Value) -> Self {
        Self {
            label: label.into(),
            kind: kind.into(),
            attributes: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            soft_dependencies: Vec::new(),
            if_dependencies: Vec::new(),
            task,
            optimization: None,
            task_id: None,
        }
    }

    /// Set an attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Add a named dependency on another label
    pub fn with_dependency(mut self, name: impl Into<String>, label: impl Into<String>) -> Self {
        self.dependencies.insert(name.into(), label.into());
        self
    }

    /// Set the optimization directive
    pub fn with_optimization(mut self, directive: OptimizationDirective) -> Self {
        self.optimization = Some(directive);
        self
    }

    /// String attribute lookup
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Boolean attribute lookup, false when absent
    pub fn attr_bool(&self, name: &str) -> bool {
        self.attributes
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Execution tier; 1 is the most trusted/visible, larger is worse
    pub fn tier(&self) -> u64 {
        self.attributes
            .get("tier")
            .and_then(Value::as_u64)
            .unwrap_or(1)
    }

    /// Mandatory sign-offs this task carries
    pub fn required_signoffs(&self) -> BTreeSet<String> {
        self.attributes
            .get("required-signoffs")
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

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let task = Task::new("build-linux64/opt", "build", json!({"payload": {}}))
            .with_attribute("tier", 2)
            .with_dependency("toolchain", "toolchain-clang");

        assert_eq!(task.tier(), 2);
        assert_eq!(
            task.dependencies.get("toolchain").map(String::as_str),
            Some("toolchain-clang")
        );
    }

    #[test]
    fn test_tier_defaults_to_one() {
        let task = Task::new("x", "build", json!({}));
        assert_eq!(task.tier(), 1);
    }

    #[test]
    fn test_required_signoffs() {
        let task = Task::new("x", "signing", json!({}))
            .with_attribute("required-signoffs", json!(["release", "security"]));
        let signoffs = task.required_signoffs();
        assert!(signoffs.contains("release"));
        assert!(signoffs.contains("security"));
    }

    #[test]
    fn test_index_path() {
        let directive = OptimizationDirective::IndexSearch {
            cache_name: "toolchain-clang".to_string(),
            digest: CacheDigest::from_data(vec!["a".into()]),
        };
        let path = directive.index_path("gantry.v2").unwrap();
        assert!(path.starts_with("gantry.v2.cache.toolchain-clang.hash."));

        assert_eq!(OptimizationDirective::AlwaysRun.index_path("gantry.v2"), None);
    }

    #[test]
    fn test_directive_serialization_is_tagged() {
        let directive = OptimizationDirective::AlwaysRun;
        let json = serde_json::to_value(&directive).unwrap();
        assert_eq!(json["strategy"], "always-run");

        let directive = OptimizationDirective::IndexSearch {
            cache_name: "c".to_string(),
            digest: CacheDigest::from_data(vec![]),
        };
        let json = serde_json::to_value(&directive).unwrap();
        assert_eq!(json["strategy"], "index-search");
        assert_eq!(json["cache-name"], "c");
    }
}

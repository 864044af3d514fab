//! Graph and kind configuration loading

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};

/// File name of the graph-wide configuration
pub const GRAPH_CONFIG_FILE: &str = "gantry.yml";

/// File name of a kind's configuration inside its directory
pub const KIND_CONFIG_FILE: &str = "kind.yml";

/// Graph-wide configuration (`gantry.yml`)
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    /// Projects in the trusted-integration set; everything else is untrusted
    #[serde(rename = "trusted-projects")]
    pub trusted_projects: Vec<String>,

    /// Index namespace prefix for published results (e.g. `gantry.v2`)
    #[serde(rename = "index-prefix")]
    pub index_prefix: String,

    /// Worker-type aliases, raw keyed-by structures resolved at lowering time
    /// against trust level and release level
    #[serde(rename = "worker-aliases")]
    pub worker_aliases: BTreeMap<String, Value>,

    /// Path of the trusted runner script, relative to the configuration file
    #[serde(rename = "runner-path", default)]
    pub runner_path: Option<PathBuf>,

    /// Content hash of the trusted runner; computed from `runner-path` at load
    /// time when not given explicitly
    #[serde(rename = "runner-hash", default)]
    pub runner_hash: String,
}

impl GraphConfig {
    /// Load and validate the graph configuration.
    ///
    /// When `runner-path` is set, the runner script's content hash is computed
    /// here so every consumer sees the same value for the whole generation.
    pub fn load(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "loading graph config");
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.to_path_buf()))?;
        let mut config: GraphConfig =
            serde_yaml::from_str(&content).map_err(ConfigError::Yaml)?;

        if config.runner_hash.is_empty() {
            let runner_path = config.runner_path.as_ref().ok_or_else(|| {
                ConfigError::MissingField("runner-path or runner-hash".to_string())
            })?;
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            let runner = std::fs::read(base.join(runner_path)).map_err(ConfigError::Io)?;
            config.runner_hash = format!("{:x}", Sha256::digest(&runner));
            debug!(hash = %config.runner_hash, "computed runner hash");
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.index_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "index-prefix".to_string(),
                message: "must not be empty".to_string(),
            }
            .into());
        }
        if self.trusted_projects.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "trusted-projects".to_string(),
                message: "must name at least one project".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Whether `project` belongs to the trusted-integration set
    pub fn is_trusted(&self, project: &str) -> bool {
        self.trusted_projects.iter().any(|p| p == project)
    }
}

/// One kind's configuration (`kinds/<name>/kind.yml`)
#[derive(Debug, Clone)]
pub struct KindConfig {
    /// Kind name, taken from the directory name
    pub name: String,
    /// Directory the configuration was read from
    pub path: PathBuf,
    /// Ordered transform stage names for this kind's pipeline
    pub transforms: Vec<String>,
    /// Kinds whose tasks must be generated before this one
    pub kind_dependencies: Vec<String>,
    /// Defaults merged under every task stanza
    pub task_defaults: Value,
    /// Ordered named task stanzas
    pub tasks: Value,
}

#[derive(Debug, Deserialize)]
struct RawKindConfig {
    transforms: Vec<String>,
    #[serde(rename = "kind-dependencies", default)]
    kind_dependencies: Vec<String>,
    #[serde(rename = "task-defaults", default)]
    task_defaults: Value,
    #[serde(default)]
    tasks: Value,
}

impl KindConfig {
    /// Load one kind from its directory
    pub fn load(dir: &Path) -> Result<Self> {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "kind".to_string(),
                message: format!("cannot derive kind name from {}", dir.display()),
            })?;

        let config_path = dir.join(KIND_CONFIG_FILE);
        debug!(kind = %name, path = %config_path.display(), "loading kind config");
        let content = std::fs::read_to_string(&config_path)
            .map_err(|_| ConfigError::NotFound(config_path.clone()))?;
        let raw: RawKindConfig = serde_yaml::from_str(&content).map_err(ConfigError::Yaml)?;

        if raw.transforms.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{name}.transforms"),
                message: "kind must name at least one transform stage".to_string(),
            }
            .into());
        }

        Ok(Self {
            name,
            path: dir.to_path_buf(),
            transforms: raw.transforms,
            kind_dependencies: raw.kind_dependencies,
            task_defaults: raw.task_defaults,
            tasks: raw.tasks,
        })
    }

    /// Load every kind under `kinds_root`, sorted by name for stable iteration
    pub fn load_all(kinds_root: &Path) -> Result<Vec<Self>> {
        let mut kinds = Vec::new();
        let entries = std::fs::read_dir(kinds_root).map_err(ConfigError::Io)?;
        for entry in entries {
            let entry = entry.map_err(ConfigError::Io)?;
            let path = entry.path();
            if path.is_dir() && path.join(KIND_CONFIG_FILE).exists() {
                kinds.push(Self::load(&path)?);
            }
        }
        kinds.sort_by(|a, b| a.name.cmp(&b.name));
        info!(count = kinds.len(), "loaded kinds");
        Ok(kinds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_graph_config(dir: &Path) -> PathBuf {
        std::fs::write(dir.join("run-task"), "#!/bin/sh\nexec \"$@\"\n").unwrap();
        let path = dir.join(GRAPH_CONFIG_FILE);
        std::fs::write(
            &path,
            r#"
trusted-projects: [integration, release]
index-prefix: gantry.v2
runner-path: run-task
worker-aliases:
  b-linux:
    provisioner: prod
    worker-pool: b-linux-large
"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_load_graph_config_computes_runner_hash() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_graph_config(temp.path());

        let config = GraphConfig::load(&path).unwrap();
        assert_eq!(config.runner_hash.len(), 64);
        assert!(config.is_trusted("integration"));
        assert!(!config.is_trusted("try"));
    }

    #[test]
    fn test_runner_hash_tracks_runner_content() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_graph_config(temp.path());
        let first = GraphConfig::load(&path).unwrap().runner_hash;

        std::fs::write(temp.path().join("run-task"), "#!/bin/sh\nset -e\nexec \"$@\"\n")
            .unwrap();
        let second = GraphConfig::load(&path).unwrap().runner_hash;
        assert_ne!(first, second);
    }

    #[test]
    fn test_load_kind_config() {
        let temp = tempfile::tempdir().unwrap();
        let kind_dir = temp.path().join("build");
        std::fs::create_dir(&kind_dir).unwrap();
        std::fs::write(
            kind_dir.join(KIND_CONFIG_FILE),
            r#"
transforms: [defaults, validate, lower]
kind-dependencies: [toolchain]
task-defaults:
  worker-type: b-linux
tasks:
  linux64/opt:
    description: linux build
"#,
        )
        .unwrap();

        let kind = KindConfig::load(&kind_dir).unwrap();
        assert_eq!(kind.name, "build");
        assert_eq!(kind.transforms, vec!["defaults", "validate", "lower"]);
        assert_eq!(kind.kind_dependencies, vec!["toolchain"]);
        assert!(kind.tasks.get("linux64/opt").is_some());
    }

    #[test]
    fn test_kind_without_transforms_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let kind_dir = temp.path().join("broken");
        std::fs::create_dir(&kind_dir).unwrap();
        std::fs::write(kind_dir.join(KIND_CONFIG_FILE), "transforms: []\n").unwrap();

        assert!(KindConfig::load(&kind_dir).is_err());
    }

    #[test]
    fn test_load_all_sorted() {
        let temp = tempfile::tempdir().unwrap();
        for name in ["test", "build", "toolchain"] {
            let dir = temp.path().join(name);
            std::fs::create_dir(&dir).unwrap();
            std::fs::write(dir.join(KIND_CONFIG_FILE), "transforms: [lower]\n").unwrap();
        }

        let kinds = KindConfig::load_all(temp.path()).unwrap();
        let names: Vec<_> = kinds.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["build", "test", "toolchain"]);
    }
}

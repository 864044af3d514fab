//! Artifact persistence and shard combination
//!
//! A single generation invocation writes unsuffixed artifacts. When one run is
//! sharded (multiple retrigger batches, for instance) each invocation writes a
//! uniquely suffixed set, and `combine_artifacts` unions them into the
//! canonical unsuffixed files before anything treats them as authoritative.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::Result;

/// The optimized graph actually submitted
pub const TASK_GRAPH: &str = "task-graph.json";
/// The full pre-optimization graph
pub const FULL_TASK_GRAPH: &str = "full-task-graph.json";
/// Label → task id map
pub const LABEL_TO_TASKID: &str = "label-to-taskid.json";
/// Labels explicitly requested to run
pub const TO_RUN: &str = "to-run.json";
/// Action manifest
pub const ACTIONS: &str = "actions.json";
/// Frozen run parameters
pub const PARAMETERS: &str = "parameters.json";

/// Artifact bases subject to sharding and combination
const SHARDED: [&str; 3] = [TASK_GRAPH, LABEL_TO_TASKID, TO_RUN];

/// File name for `base` under an optional shard suffix
/// (`task-graph.json` → `task-graph.2.json`)
pub fn artifact_name(base: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => match base.strip_suffix(".json") {
            Some(stem) => format!("{stem}.{suffix}.json"),
            None => format!("{base}.{suffix}"),
        },
        None => base.to_string(),
    }
}

/// Write one artifact as pretty JSON
pub fn write_artifact(dir: &Path, base: &str, suffix: Option<&str>, value: &Value) -> Result<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join(artifact_name(base, suffix));
    debug!(path = %path.display(), "writing artifact");
    fs::write(&path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

/// Read one artifact back
pub fn read_artifact(path: &Path) -> Result<Value> {
    Ok(serde_json::from_slice(&fs::read(path)?)?)
}

/// Combine every sharded artifact set under `dir` into its canonical file.
///
/// Disjoint keys merge cleanly; colliding keys take the last shard's value.
/// Shards merge in numeric suffix order when the suffixes are numbers, file
/// name order otherwise. List artifacts union preserving first-seen order.
/// A single shard is combined via rename, not copy.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn combine_artifacts(dir: &Path) -> Result<()> {
    for base in SHARDED {
        let shards = shard_paths(dir, base)?;
        if shards.is_empty() {
            continue;
        }
        let canonical = dir.join(base);

        if shards.len() == 1 {
            debug!(shard = %shards[0].display(), "single shard, renaming");
            fs::rename(&shards[0], &canonical)?;
            continue;
        }

        let mut merged: Option<Value> = None;
        for shard in &shards {
            let value = read_artifact(shard)?;
            merged = Some(match merged {
                None => value,
                Some(acc) => merge(acc, value),
            });
        }
        if let Some(merged) = merged {
            fs::write(&canonical, serde_json::to_vec_pretty(&merged)?)?;
        }
        for shard in &shards {
            fs::remove_file(shard)?;
        }
        info!(base, shards = shards.len(), "combined shards");
    }
    Ok(())
}

/// Suffixed shard files for `base`, ordered by shard number when the suffix
/// is numeric (so shard 10 follows shard 2), by file name otherwise
fn shard_paths(dir: &Path, base: &str) -> Result<Vec<PathBuf>> {
    let stem = base.strip_suffix(".json").unwrap_or(base);
    let prefix = format!("{stem}.");

    let mut shards = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name != base && name.starts_with(&prefix) && name.ends_with(".json") {
            shards.push(path);
        }
    }
    shards.sort_by_key(|path| {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let number = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".json"))
            .and_then(|suffix| suffix.parse::<u64>().ok());
        (number.is_none(), number, name)
    });
    Ok(shards)
}

fn merge(acc: Value, next: Value) -> Value {
    match (acc, next) {
        (Value::Object(mut acc), Value::Object(next)) => {
            for (key, value) in next {
                acc.insert(key, value);
            }
            Value::Object(acc)
        }
        (Value::Array(mut acc), Value::Array(next)) => {
            for value in next {
                if !acc.contains(&value) {
                    acc.push(value);
                }
            }
            Value::Array(acc)
        }
        (_, next) => next,
    }
}

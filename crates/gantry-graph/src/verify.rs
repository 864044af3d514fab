//! Whole-graph verification
//!
//! Structural invariants that can only be judged with the complete graph in
//! hand are checked here, once, after the full graph is built. Violations are
//! programming errors in the declarative configuration and are always fatal;
//! catching them here is far more diagnosable than a platform rejection later.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{debug, info, instrument};

use gantry_core::GraphConfig;

use crate::graph::TaskGraph;
use crate::task::Task;
use crate::{RUN_CACHE_PREFIX, VCS_CACHE_PREFIX};

/// A failed verification check, carrying every violation that check found
#[derive(Debug, thiserror::Error)]
#[error("graph verification '{check}' failed:\n  {}", violations.join("\n  "))]
pub struct VerificationError {
    /// Name of the failing check
    pub check: &'static str,
    /// All violations found by that check
    pub violations: Vec<String>,
}

type Check = fn(&TaskGraph, &GraphConfig) -> Vec<String>;

/// Run every verification check over the complete graph.
///
/// Each check reports all of its violations together; the pass stops at the
/// first failing check.
#[instrument(skip_all, fields(tasks = graph.len()))]
pub fn verify_graph(graph: &TaskGraph, config: &GraphConfig) -> Result<(), VerificationError> {
    let checks: [(&'static str, Check); 6] = [
        ("dependency-tiers", check_dependency_tiers),
        ("required-signoffs", check_required_signoffs),
        ("cache-volumes", check_cache_volumes),
        ("reserved-cache-names", check_reserved_cache_names),
        ("toolchain-aliases", check_toolchain_aliases),
        ("display-tuples", check_display_tuples),
    ];

    for (name, check) in checks {
        debug!(check = name, "running verification check");
        let violations = check(graph, config);
        if !violations.is_empty() {
            return Err(VerificationError {
                check: name,
                violations,
            });
        }
    }

    info!("graph verification passed");
    Ok(())
}

/// A task may only depend on tasks of equal or better (numerically lower) tier
fn check_dependency_tiers(graph: &TaskGraph, _config: &GraphConfig) -> Vec<String> {
    let mut violations = Vec::new();
    for task in graph.tasks().values() {
        for target in task.dependencies.values() {
            if let Some(dep) = graph.get(target) {
                if dep.tier() > task.tier() {
                    violations.push(format!(
                        "'{}' (tier {}) may not depend on '{}' (tier {})",
                        task.label,
                        task.tier(),
                        dep.label,
                        dep.tier()
                    ));
                }
            }
        }
    }
    violations
}

/// A dependency's mandatory sign-offs must be a subset of the consumer's
fn check_required_signoffs(graph: &TaskGraph, _config: &GraphConfig) -> Vec<String> {
    let mut violations = Vec::new();
    for task in graph.tasks().values() {
        let own = task.required_signoffs();
        for target in task.dependencies.values() {
            if let Some(dep) = graph.get(target) {
                let missing: Vec<_> = dep
                    .required_signoffs()
                    .difference(&own)
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    violations.push(format!(
                        "'{}' depends on '{}' but lacks its sign-offs: {}",
                        task.label,
                        dep.label,
                        missing.join(", ")
                    ));
                }
            }
        }
    }
    violations
}

/// Every cache mount path must be declared as an isolated volume of the
/// execution image
fn check_cache_volumes(graph: &TaskGraph, _config: &GraphConfig) -> Vec<String> {
    let mut violations = Vec::new();
    for task in graph.tasks().values() {
        let volumes: BTreeSet<&str> = payload_strings(task, "volumes");
        for (name, mount) in payload_caches(task) {
            if !volumes.contains(mount) {
                violations.push(format!(
                    "'{}' mounts cache '{}' at '{}' which is not a declared volume",
                    task.label, name, mount
                ));
            }
        }
    }
    violations
}

/// Reserved cache-name families require the trusted runner and must embed its
/// content hash, so changing the runner invalidates every dependent cache
fn check_reserved_cache_names(graph: &TaskGraph, config: &GraphConfig) -> Vec<String> {
    let mut violations = Vec::new();
    let hash_tag = &config.runner_hash[..8.min(config.runner_hash.len())];

    for task in graph.tasks().values() {
        for (name, _) in payload_caches(task) {
            let reserved =
                name.starts_with(RUN_CACHE_PREFIX) || name.starts_with(VCS_CACHE_PREFIX);
            if !reserved {
                continue;
            }
            if !task.attr_bool("uses-runner") {
                violations.push(format!(
                    "'{}' uses reserved cache '{}' without invoking the trusted runner",
                    task.label, name
                ));
            }
            if !name.ends_with(hash_tag) {
                violations.push(format!(
                    "'{}' reserved cache '{}' does not embed the runner hash '{}'",
                    task.label, name, hash_tag
                ));
            }
        }
    }
    violations
}

/// Toolchain aliases must be unique across the whole graph
fn check_toolchain_aliases(graph: &TaskGraph, _config: &GraphConfig) -> Vec<String> {
    let mut violations = Vec::new();
    let mut seen: BTreeMap<String, &str> = BTreeMap::new();

    for task in graph.tasks().values() {
        for alias in toolchain_aliases(task) {
            match seen.get(&alias) {
                Some(previous) => violations.push(format!(
                    "toolchain alias '{}' claimed by both '{}' and '{}'",
                    alias, previous, task.label
                )),
                None => {
                    seen.insert(alias, &task.label);
                }
            }
        }
    }
    violations
}

/// (platform, group, symbol) display tuples must be unique across the graph
fn check_display_tuples(graph: &TaskGraph, _config: &GraphConfig) -> Vec<String> {
    let mut violations = Vec::new();
    let mut seen: BTreeMap<(String, String, String), &str> = BTreeMap::new();

    for task in graph.tasks().values() {
        let Some(display) = task.task.get("extra").and_then(|e| e.get("display")) else {
            continue;
        };
        let get = |key: &str| {
            display
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string()
        };
        let tuple = (get("platform"), get("group"), get("symbol"));
        if tuple.0.is_empty() && tuple.2.is_empty() {
            continue;
        }
        match seen.get(&tuple) {
            Some(previous) => violations.push(format!(
                "display tuple ({}, {}, {}) claimed by both '{}' and '{}'",
                tuple.0, tuple.1, tuple.2, previous, task.label
            )),
            None => {
                seen.insert(tuple, &task.label);
            }
        }
    }
    violations
}

fn payload_strings<'a>(task: &'a Task, key: &str) -> BTreeSet<&'a str> {
    task.task
        .get("payload")
        .and_then(|p| p.get(key))
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn payload_caches(task: &Task) -> Vec<(&str, &str)> {
    task.task
        .get("payload")
        .and_then(|p| p.get("caches"))
        .and_then(Value::as_array)
        .map(|caches| {
            caches
                .iter()
                .filter_map(|c| {
                    let name = c.get("name").and_then(Value::as_str)?;
                    let mount = c.get("mount-point").and_then(Value::as_str)?;
                    Some((name, mount))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn toolchain_aliases(task: &Task) -> Vec<String> {
    match task.attributes.get("toolchain-alias") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(a)) => a
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

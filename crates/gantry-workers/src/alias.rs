//! Worker-type alias resolution
//!
//! Kind configurations reference worker types by alias; the graph
//! configuration maps each alias, via keyed-by structures over trust level and
//! release level, to the concrete (provisioner, pool) pair.

use std::collections::BTreeMap;

use serde_json::Value;

use gantry_core::{resolve_keyed_by, GraphConfig, Parameters};

use crate::error::LoweringError;

/// Concrete submission target for a worker-type alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerTarget {
    /// Provisioner id
    pub provisioner: String,
    /// Worker pool within the provisioner
    pub pool: String,
}

/// Resolve `alias` for the current run
pub fn resolve_worker_type(
    alias: &str,
    label: &str,
    graph_config: &GraphConfig,
    params: &Parameters,
) -> Result<WorkerTarget, LoweringError> {
    let entry = graph_config.worker_aliases.get(alias).ok_or_else(|| {
        LoweringError::UnknownWorkerType {
            label: label.to_string(),
            alias: alias.to_string(),
        }
    })?;

    let mut context: BTreeMap<String, String> = BTreeMap::new();
    context.insert("level".to_string(), params.level().to_string());
    context.insert(
        "release-level".to_string(),
        release_level(graph_config, params).to_string(),
    );

    let provisioner = resolve_field(entry, "provisioner", alias, label, &context)?;
    let pool = resolve_field(entry, "worker-pool", alias, label, &context)?;

    Ok(WorkerTarget { provisioner, pool })
}

/// Release level: production only for trusted projects at the highest trust
/// level, staging everywhere else
fn release_level(graph_config: &GraphConfig, params: &Parameters) -> &'static str {
    if graph_config.is_trusted(params.project()) && params.level() >= 3 {
        "production"
    } else {
        "staging"
    }
}

fn resolve_field(
    entry: &Value,
    field: &str,
    alias: &str,
    label: &str,
    context: &BTreeMap<String, String>,
) -> Result<String, LoweringError> {
    let raw = entry.get(field).ok_or_else(|| LoweringError::Invalid {
        label: label.to_string(),
        message: format!("worker alias '{alias}' lacks '{field}'"),
    })?;
    let resolved = resolve_keyed_by(raw, field, alias, context, &[], true)?;
    resolved
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| LoweringError::Invalid {
            label: label.to_string(),
            message: format!("worker alias '{alias}' field '{field}' is not a string"),
        })
}

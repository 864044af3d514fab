//! The optimization pass
//!
//! Walks the full graph in topological order, asking each task's strategy for
//! a usable prior execution. Replaced nodes leave the graph; the ids they
//! resolved to seed the label→task-id map so later creation treats their
//! labels as already satisfied.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, instrument};

use gantry_graph::TaskGraph;

use crate::error::{OptimizeError, Result};
use crate::strategy::{directive_name, StrategyRegistry};

/// Output of the optimization pass
pub struct OptimizedGraph {
    /// The graph with replaced nodes removed
    pub graph: TaskGraph,
    /// Labels of replaced nodes and the prior execution ids they resolved to
    pub replacements: BTreeMap<String, String>,
}

/// Optimize `graph`, never touching labels in `do_not_optimize`.
///
/// Callers put explicitly enumerated target labels into `do_not_optimize`;
/// those exact tasks then always run even when cached, while their ancestors
/// may still be replaced.
#[instrument(skip_all, fields(tasks = graph.len(), pinned = do_not_optimize.len()))]
pub async fn optimize_graph(
    graph: &TaskGraph,
    registry: &StrategyRegistry,
    do_not_optimize: &BTreeSet<String>,
) -> Result<OptimizedGraph> {
    let mut replacements: BTreeMap<String, String> = BTreeMap::new();

    for label in graph.sorted() {
        let task = graph
            .get(label)
            .expect("sorted order only contains graph labels");
        if do_not_optimize.contains(label) {
            continue;
        }
        let Some(directive) = &task.optimization else {
            continue;
        };

        let name = directive_name(directive);
        let strategy = registry
            .get(name)
            .ok_or_else(|| OptimizeError::UnknownStrategy {
                label: label.clone(),
                strategy: name.to_string(),
            })?;

        if let Some(task_id) = strategy.replacement(task, directive).await? {
            info!(label = %label, task_id = %task_id, "replaced by prior execution");
            replacements.insert(label.clone(), task_id);
        }
    }

    let kept: BTreeMap<_, _> = graph
        .tasks()
        .iter()
        .filter(|(label, _)| !replacements.contains_key(*label))
        .map(|(label, task)| (label.clone(), task.clone()))
        .collect();

    // Edges into replaced nodes stay label-valued; creation rewrites them to
    // ids from the seed map. Edges already external to the full graph remain so.
    let external: BTreeSet<String> = kept
        .values()
        .flat_map(|t| t.dependencies.values())
        .filter(|target| !kept.contains_key(*target))
        .cloned()
        .collect();

    let optimized = TaskGraph::new(kept, &external)?;
    info!(
        kept = optimized.len(),
        replaced = replacements.len(),
        "optimization pass complete"
    );

    Ok(OptimizedGraph {
        graph: optimized,
        replacements,
    })
}

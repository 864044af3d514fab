//! Task graph construction and traversal

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde_json::Value;
use tracing::{info, instrument};

use crate::task::{Task, MAX_DEPENDENCIES};

/// Immutable directed acyclic graph of tasks, keyed by label.
///
/// The edge relation is derived from each task's `dependencies`; construction
/// fails on dangling edges (unless covered by the supplied external overlay),
/// on cycles, and on oversized fan-in.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: BTreeMap<String, Task>,
    /// Topologically sorted labels, producers before consumers
    sorted_order: Vec<String>,
}

impl TaskGraph {
    /// Build a graph from tasks.
    ///
    /// `external_labels` lists labels satisfied outside this graph (an
    /// already-created label→execution-id overlay); edges to them are legal
    /// but they contribute no nodes.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub fn new(
        tasks: BTreeMap<String, Task>,
        external_labels: &BTreeSet<String>,
    ) -> Result<Self, GraphError> {
        for task in tasks.values() {
            if task.dependencies.len() > MAX_DEPENDENCIES {
                return Err(GraphError::TooManyDependencies {
                    label: task.label.clone(),
                    count: task.dependencies.len(),
                    max: MAX_DEPENDENCIES,
                });
            }
            for (dep_name, target) in &task.dependencies {
                if !tasks.contains_key(target) && !external_labels.contains(target) {
                    return Err(GraphError::DanglingDependency {
                        label: task.label.clone(),
                        dep_name: dep_name.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        let sorted_order = topological_sort(&tasks)?;
        info!(task_count = tasks.len(), "task graph built");

        Ok(Self {
            tasks,
            sorted_order,
        })
    }

    /// Build a graph with no external overlay
    pub fn from_tasks(tasks: BTreeMap<String, Task>) -> Result<Self, GraphError> {
        Self::new(tasks, &BTreeSet::new())
    }

    /// Get a task by label
    pub fn get(&self, label: &str) -> Option<&Task> {
        self.tasks.get(label)
    }

    /// All tasks, keyed by label
    pub fn tasks(&self) -> &BTreeMap<String, Task> {
        &self.tasks
    }

    /// All labels in sorted order
    pub fn labels(&self) -> impl Iterator<Item = &String> {
        self.tasks.keys()
    }

    /// Number of tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the graph is empty
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Topologically sorted labels: every task appears after its dependencies
    pub fn sorted(&self) -> &[String] {
        &self.sorted_order
    }

    /// Forward-transitive closure of `requested` over the dependency edges:
    /// every ancestor a requested label depends on, directly or transitively.
    /// Labels not present in the graph are ignored.
    pub fn transitive_closure(&self, requested: &[String]) -> BTreeSet<String> {
        let mut closure: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<&str> = requested
            .iter()
            .filter(|l| self.tasks.contains_key(l.as_str()))
            .map(String::as_str)
            .collect();

        while let Some(label) = queue.pop_front() {
            if !closure.insert(label.to_string()) {
                continue;
            }
            if let Some(task) = self.tasks.get(label) {
                for target in task.dependencies.values() {
                    if self.tasks.contains_key(target) && !closure.contains(target) {
                        queue.push_back(target);
                    }
                }
            }
        }

        closure
    }

    /// New graph restricted to `labels`; edges to labels outside the subset
    /// are treated as satisfied externally
    pub fn subgraph(&self, labels: &BTreeSet<String>) -> Result<Self, GraphError> {
        let tasks: BTreeMap<String, Task> = self
            .tasks
            .iter()
            .filter(|(label, _)| labels.contains(*label))
            .map(|(label, task)| (label.clone(), task.clone()))
            .collect();

        let external: BTreeSet<String> = tasks
            .values()
            .flat_map(|t| t.dependencies.values())
            .filter(|target| !tasks.contains_key(*target))
            .cloned()
            .collect();

        Self::new(tasks, &external)
    }

    /// Serialize as label → {task, attributes, dependencies, ...}
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.tasks).unwrap_or(Value::Null)
    }

    /// Deserialize a graph previously written by [`TaskGraph::to_json`].
    ///
    /// Edges to labels outside the serialized set are accepted; sharded
    /// invocations persist subgraphs whose dependencies were satisfied by
    /// earlier shards.
    pub fn from_json(value: Value) -> Result<Self, GraphError> {
        let tasks: BTreeMap<String, Task> =
            serde_json::from_value(value).map_err(|e| GraphError::Deserialize(e.to_string()))?;
        let external: BTreeSet<String> = tasks
            .values()
            .flat_map(|t| t.dependencies.values())
            .filter(|target| !tasks.contains_key(*target))
            .cloned()
            .collect();
        Self::new(tasks, &external)
    }
}

/// Kahn's algorithm; deterministic because ready labels are drained in sorted order
fn topological_sort(tasks: &BTreeMap<String, Task>) -> Result<Vec<String>, GraphError> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (label, task) in tasks {
        let degree = task
            .dependencies
            .values()
            .filter(|t| tasks.contains_key(*t))
            .count();
        in_degree.insert(label, degree);
        for target in task.dependencies.values() {
            if tasks.contains_key(target) {
                dependents.entry(target).or_default().push(label);
            }
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(l, _)| *l)
        .collect();
    let mut sorted: Vec<String> = Vec::with_capacity(tasks.len());

    while let Some(label) = ready.iter().next().copied() {
        ready.remove(label);
        sorted.push(label.to_string());

        if let Some(consumers) = dependents.get(label) {
            for consumer in consumers {
                if let Some(degree) = in_degree.get_mut(consumer) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(consumer);
                    }
                }
            }
        }
    }

    if sorted.len() != tasks.len() {
        let in_sorted: BTreeSet<&str> = sorted.iter().map(String::as_str).collect();
        let cyclic: Vec<String> = tasks
            .keys()
            .filter(|l| !in_sorted.contains(l.as_str()))
            .cloned()
            .collect();
        return Err(GraphError::CyclicDependency(cyclic.join(", ")));
    }

    Ok(sorted)
}

/// Errors during graph construction
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A dependency references a label neither in the graph nor the overlay
    #[error("task '{label}' dependency '{dep_name}' references unknown label '{target}'")]
    DanglingDependency {
        label: String,
        dep_name: String,
        target: String,
    },

    /// Cyclic dependency detected
    #[error("cyclic dependency detected among tasks: {0}")]
    CyclicDependency(String),

    /// Dependency fan-in exceeds the platform limit
    #[error("task '{label}' has {count} dependencies, exceeding the platform limit of {max}")]
    TooManyDependencies {
        label: String,
        count: usize,
        max: usize,
    },

    /// Serialized graph could not be decoded
    #[error("cannot deserialize task graph: {0}")]
    Deserialize(String),
}

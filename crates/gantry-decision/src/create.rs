//! Dependency-closure task creation
//!
//! Realizes the requested labels and everything they transitively depend on.
//! The closure is computed over the graph's unmodified edges; only after the
//! node set is fixed is the caller's modifier applied, so modifiers must not
//! change dependency structure. Dependency references are rewritten from
//! labels to task ids, and the id map is threaded through so repeated calls
//! within one generation never recreate already-created work.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use gantry_graph::{Task, TaskGraph, DOCKER_IMAGE_DEP};
use gantry_platform::Queue;

use crate::error::{DecisionError, Result};
use crate::ids::new_task_id;

/// Per-node hook applied after the closure's node set is fixed
pub type Modifier<'a> = &'a (dyn Fn(&mut Task) + Send + Sync);

/// Create the dependency closure of `requested` on the platform.
///
/// Labels already present in `label_to_taskid` are treated as created and are
/// neither resubmitted nor re-assigned; the map gains one entry per newly
/// created task. Returns the labels created by this call in submission order.
#[instrument(skip_all, fields(requested = requested.len()))]
pub async fn create_tasks(
    queue: &dyn Queue,
    graph: &TaskGraph,
    requested: &[String],
    label_to_taskid: &mut BTreeMap<String, String>,
    modifier: Option<Modifier<'_>>,
    decision_id: &str,
) -> Result<Vec<String>> {
    let closure = graph.transitive_closure(requested);

    let to_create: Vec<String> = graph
        .sorted()
        .iter()
        .filter(|label| closure.contains(*label) && !label_to_taskid.contains_key(*label))
        .cloned()
        .collect();
    for label in &to_create {
        label_to_taskid.insert(label.clone(), new_task_id());
    }

    for label in &to_create {
        let mut task = graph
            .get(label)
            .expect("closure only contains graph labels")
            .clone();
        if let Some(modify) = modifier {
            modify(&mut task);
        }

        let task_id = label_to_taskid[label].clone();
        let definition = build_definition(&task, label_to_taskid, decision_id)?;
        debug!(label = %label, task_id = %task_id, "submitting task");
        queue.create_task(&task_id, &definition).await?;
    }

    info!(created = to_create.len(), "task creation complete");
    Ok(to_create)
}

/// Final submission payload: the lowered definition plus resolved dependency
/// ids and, for image consumers, the chain-of-trust input annotation
fn build_definition(
    task: &Task,
    label_to_taskid: &BTreeMap<String, String>,
    decision_id: &str,
) -> Result<Value> {
    let mut definition = task.task.clone();

    let mut dep_ids: BTreeSet<String> = BTreeSet::new();
    for target in task.dependencies.values() {
        let id = label_to_taskid
            .get(target)
            .ok_or_else(|| DecisionError::MissingDependency {
                label: task.label.clone(),
                target: target.clone(),
            })?;
        dep_ids.insert(id.clone());
    }
    // Rootless tasks hang off the decision task itself
    let dep_ids: Vec<String> = if dep_ids.is_empty() {
        vec![decision_id.to_string()]
    } else {
        dep_ids.into_iter().collect()
    };
    definition["dependencies"] = json!(dep_ids);

    if let Some(image_label) = task.dependencies.get(DOCKER_IMAGE_DEP) {
        let image_id = &label_to_taskid[image_label];
        ensure_object(&mut definition, "extra");
        ensure_object(&mut definition["extra"], "chain-of-trust");
        ensure_object(&mut definition["extra"]["chain-of-trust"], "inputs");
        definition["extra"]["chain-of-trust"]["inputs"][DOCKER_IMAGE_DEP] = json!(image_id);
    }

    Ok(definition)
}

fn ensure_object(value: &mut Value, key: &str) {
    if value.get(key).map(Value::is_object) != Some(true) {
        value[key] = json!({});
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_platform::MemoryQueue;
    use serde_json::json;

    fn task(label: &str, deps: &[(&str, &str)]) -> Task {
        let mut t = Task::new(label, "test", json!({"payload": {}}));
        for (name, target) in deps {
            t = t.with_dependency(*name, *target);
        }
        t
    }

    fn chain_graph() -> TaskGraph {
        // X -> Y -> Z, W unrelated
        let tasks = vec![
            task("Z", &[]),
            task("Y", &[("parent", "Z")]),
            task("X", &[("parent", "Y")]),
            task("W", &[]),
        ];
        TaskGraph::from_tasks(tasks.into_iter().map(|t| (t.label.clone(), t)).collect())
            .unwrap()
    }

    #[tokio::test]
    async fn test_exact_closure_created() {
        let queue = MemoryQueue::new();
        let mut map = BTreeMap::new();

        let created = create_tasks(
            &queue,
            &chain_graph(),
            &["X".to_string()],
            &mut map,
            None,
            "DecisionTask00",
        )
        .await
        .unwrap();

        assert_eq!(created, vec!["Z", "Y", "X"]);
        assert!(!map.contains_key("W"));
        assert_eq!(queue.created().len(), 3);
    }

    #[tokio::test]
    async fn test_dependencies_rewritten_to_ids() {
        let queue = MemoryQueue::new();
        let mut map = BTreeMap::new();
        create_tasks(
            &queue,
            &chain_graph(),
            &["X".to_string()],
            &mut map,
            None,
            "DecisionTask00",
        )
        .await
        .unwrap();

        let created = queue.created();
        let x = &created[&map["X"]];
        assert_eq!(x["dependencies"], json!([map["Y"].clone()]));
        // a rootless task depends on the decision task
        let z = &created[&map["Z"]];
        assert_eq!(z["dependencies"], json!(["DecisionTask00"]));
    }

    #[tokio::test]
    async fn test_repeated_calls_do_not_recreate() {
        let queue = MemoryQueue::new();
        let graph = chain_graph();
        let mut map = BTreeMap::new();

        create_tasks(&queue, &graph, &["Y".to_string()], &mut map, None, "D").await.unwrap();
        let first_ids = map.clone();
        let created = create_tasks(&queue, &graph, &["X".to_string()], &mut map, None, "D")
            .await
            .unwrap();

        // only X is new; Y and Z keep their ids
        assert_eq!(created, vec!["X"]);
        assert_eq!(map["Y"], first_ids["Y"]);
        assert_eq!(map["Z"], first_ids["Z"]);
        assert_eq!(queue.created().len(), 3);
    }

    #[tokio::test]
    async fn test_overlay_seeded_labels_not_resubmitted() {
        let queue = MemoryQueue::new();
        let mut map = BTreeMap::new();
        map.insert("Z".to_string(), "PriorZ00000001".to_string());

        create_tasks(
            &queue,
            &chain_graph(),
            &["X".to_string()],
            &mut map,
            None,
            "D",
        )
        .await
        .unwrap();

        assert_eq!(queue.created().len(), 2);
        let y = &queue.created()[&map["Y"]];
        assert_eq!(y["dependencies"], json!(["PriorZ00000001"]));
    }

    #[tokio::test]
    async fn test_modifier_applied_per_node() {
        let queue = MemoryQueue::new();
        let mut map = BTreeMap::new();
        let modifier = |task: &mut Task| {
            task.task["priority"] = json!("high");
        };

        create_tasks(
            &queue,
            &chain_graph(),
            &["Z".to_string()],
            &mut map,
            Some(&modifier),
            "D",
        )
        .await
        .unwrap();

        assert_eq!(queue.created()[&map["Z"]]["priority"], "high");
    }

    #[tokio::test]
    async fn test_image_consumer_gets_chain_of_trust_input() {
        let queue = MemoryQueue::new();
        let image = task("docker-image-build", &[]);
        let build = task("build", &[(DOCKER_IMAGE_DEP, "docker-image-build")]);
        let graph = TaskGraph::from_tasks(
            [image, build]
                .into_iter()
                .map(|t| (t.label.clone(), t))
                .collect(),
        )
        .unwrap();

        let mut map = BTreeMap::new();
        create_tasks(&queue, &graph, &["build".to_string()], &mut map, None, "D")
            .await
            .unwrap();

        let build_def = &queue.created()[&map["build"]];
        assert_eq!(
            build_def["extra"]["chain-of-trust"]["inputs"]["docker-image"],
            json!(map["docker-image-build"].clone())
        );
    }
}

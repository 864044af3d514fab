//! The decision orchestrator
//!
//! One `run` is the whole story: load configuration, run every kind's pipeline
//! in dependency order, assemble and verify the full graph, select targets,
//! classify the push, optimize, merge overlays, persist artifacts, and create
//! the remaining closure on the platform.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument};

use gantry_backstop::{classify, BackstopConfig};
use gantry_core::config::GRAPH_CONFIG_FILE;
use gantry_core::{GraphConfig, KindConfig, Parameters};
use gantry_graph::{verify_graph, Task, TaskGraph};
use gantry_optimize::{optimize_graph, StrategyRegistry};
use gantry_platform::{Index, Queue, RelevancePredictor};
use gantry_transforms::{into_task, run_pipeline, Transform, TransformConfig, TransformRegistry};
use gantry_workers::Lower;

use crate::actions::action_manifest;
use crate::artifacts::{self, write_artifact};
use crate::create::create_tasks;
use crate::error::{DecisionError, Result};
use crate::overlay::fetch_overlays;

/// Directory of kind configurations under the graph root
pub const KINDS_DIR: &str = "kinds";

/// Everything a decision run produced
pub struct Generation {
    /// Graph-wide configuration the run used
    pub graph_config: Arc<GraphConfig>,
    /// The complete pre-optimization graph
    pub full_graph: TaskGraph,
    /// The graph after cached nodes were replaced
    pub optimized_graph: TaskGraph,
    /// Label → task id, overlays and replacements included
    pub label_to_taskid: BTreeMap<String, String>,
    /// Labels selected to run
    pub target_labels: Vec<String>,
    /// Labels actually created by this run, in submission order
    pub created: Vec<String>,
    /// Whether this push was classified as a backstop
    pub is_backstop: bool,
}

/// The decision run's collaborators and knobs
pub struct Decision {
    queue: Arc<dyn Queue>,
    index: Arc<dyn Index>,
    predictor: Arc<dyn RelevancePredictor>,
    backstop: BackstopConfig,
    transforms: TransformRegistry,
}

impl Decision {
    /// A decision runner with the built-in stages and default backstop knobs
    pub fn new(
        queue: Arc<dyn Queue>,
        index: Arc<dyn Index>,
        predictor: Arc<dyn RelevancePredictor>,
    ) -> Self {
        let mut transforms = TransformRegistry::builtin();
        transforms.register(Arc::new(Lower::default()));
        Self {
            queue,
            index,
            predictor,
            backstop: BackstopConfig::default(),
            transforms,
        }
    }

    /// Override the backstop intervals
    pub fn with_backstop(mut self, backstop: BackstopConfig) -> Self {
        self.backstop = backstop;
        self
    }

    /// Register an extra pipeline stage
    pub fn register_stage(&mut self, stage: Arc<dyn Transform>) {
        self.transforms.register(stage);
    }

    /// Generate and verify the full graph without touching the platform.
    ///
    /// This is the offline half of a decision run, also used by the `graph`
    /// CLI command.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn generate_graph(
        &self,
        root: &Path,
        params: Arc<Parameters>,
    ) -> Result<(Arc<GraphConfig>, TaskGraph)> {
        let graph_config = Arc::new(GraphConfig::load(&root.join(GRAPH_CONFIG_FILE))?);
        let kinds = KindConfig::load_all(&root.join(KINDS_DIR))?;
        let ordered = sort_kinds(kinds)?;

        let mut all_tasks: BTreeMap<String, Task> = BTreeMap::new();
        let mut labels_by_kind: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for kind in ordered {
            let upstream: BTreeMap<String, Task> = kind
                .kind_dependencies
                .iter()
                .flat_map(|dep| labels_by_kind.get(dep).into_iter().flatten())
                .filter_map(|label| all_tasks.get(label).map(|t| (label.clone(), t.clone())))
                .collect();

            let stage_names = kind.transforms.clone();
            let config = TransformConfig::new(
                kind,
                params.clone(),
                upstream,
                graph_config.clone(),
                false,
            );
            let stages = self.transforms.pipeline(&config.kind, &stage_names)?;

            let mut count = 0usize;
            for record in run_pipeline(&stages, &config, config.initial_records()) {
                let task = into_task(&config.kind, record?)?;
                labels_by_kind
                    .entry(config.kind.clone())
                    .or_default()
                    .push(task.label.clone());
                all_tasks.insert(task.label.clone(), task);
                count += 1;
            }
            info!(kind = %config.kind, tasks = count, "kind pipeline complete");
        }

        let graph = TaskGraph::from_tasks(all_tasks)?;
        verify_graph(&graph, &graph_config)?;
        Ok((graph_config, graph))
    }

    /// Run the full decision: generate, classify, optimize, persist, create.
    ///
    /// `shard` suffixes the sharded bookkeeping artifacts when one logical run
    /// is split across invocations; the shards are unioned back into the
    /// canonical files by `combine_artifacts`.
    #[instrument(skip_all, fields(project = params.project(), pushid = params.push_id()))]
    pub async fn run(
        &self,
        root: &Path,
        params: Arc<Parameters>,
        artifacts_dir: Option<&Path>,
        decision_id: &str,
        shard: Option<&str>,
    ) -> Result<Generation> {
        let (graph_config, full_graph) = self.generate_graph(root, params.clone())?;

        let is_backstop = classify(
            &params,
            &graph_config,
            self.index.as_ref(),
            self.queue.as_ref(),
            &self.backstop,
        )
        .await?;
        info!(push = gantry_backstop::label(is_backstop), "push classified");

        let explicit = params.target_labels();
        let mut targets: Vec<String> = if explicit.is_empty() {
            full_graph.labels().cloned().collect()
        } else {
            explicit
                .iter()
                .filter(|l| full_graph.get(l).is_some())
                .cloned()
                .collect()
        };
        // The predictor narrows attribute-driven selection only. Explicitly
        // requested labels are never second-guessed, and a backstop push runs
        // its full coverage no matter what the predictor says.
        if explicit.is_empty() && !is_backstop {
            match self.predictor.relevant_labels(params.head_rev()).await? {
                Some(relevant) => {
                    targets.retain(|label| relevant.contains(label));
                    info!(targets = targets.len(), "predictor narrowed target set");
                }
                None => info!("no prediction available, running everything"),
            }
        }

        let overlays = fetch_overlays(self.queue.clone(), &params.overlay_task_ids()).await?;
        let mut label_to_taskid = overlays.label_to_taskid;

        let optimized_graph = if is_backstop {
            full_graph.clone()
        } else {
            // Explicitly enumerated labels always run, cached or not; the
            // optimize-target-tasks knob extends that pinning to the whole
            // selected target set when disabled.
            let mut pinned: BTreeSet<String> = explicit.iter().cloned().collect();
            if !params.optimize_target_tasks() {
                pinned.extend(targets.iter().cloned());
            }
            let strategies = StrategyRegistry::builtin(
                self.index.clone(),
                self.queue.clone(),
                graph_config.index_prefix.clone(),
                Utc::now(),
            );
            let optimized = optimize_graph(&full_graph, &strategies, &pinned).await?;
            label_to_taskid.extend(optimized.replacements);
            optimized.graph
        };

        if let Some(dir) = artifacts_dir {
            write_artifact(dir, artifacts::PARAMETERS, None, &params.to_json())?;
            write_artifact(dir, artifacts::FULL_TASK_GRAPH, None, &full_graph.to_json())?;
            write_artifact(dir, artifacts::TASK_GRAPH, shard, &optimized_graph.to_json())?;
            write_artifact(
                dir,
                artifacts::ACTIONS,
                None,
                &action_manifest(&params, decision_id),
            )?;
        }

        let created = create_tasks(
            self.queue.as_ref(),
            &optimized_graph,
            &targets,
            &mut label_to_taskid,
            None,
            decision_id,
        )
        .await?;

        if let Some(dir) = artifacts_dir {
            write_artifact(dir, artifacts::LABEL_TO_TASKID, shard, &json!(label_to_taskid))?;
            write_artifact(dir, artifacts::TO_RUN, shard, &json!(targets))?;
        }

        Ok(Generation {
            graph_config,
            full_graph,
            optimized_graph,
            label_to_taskid,
            target_labels: targets,
            created,
            is_backstop,
        })
    }
}

/// Order kinds so every kind follows the kinds it depends on.
///
/// Kahn's algorithm with a sorted ready set, like the task graph itself, so
/// generation order is deterministic.
fn sort_kinds(kinds: Vec<KindConfig>) -> Result<Vec<KindConfig>> {
    let mut by_name: BTreeMap<String, KindConfig> =
        kinds.into_iter().map(|k| (k.name.clone(), k)).collect();

    let mut in_degree: BTreeMap<String, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, kind) in &by_name {
        in_degree.entry(name.clone()).or_insert(0);
        for dep in &kind.kind_dependencies {
            if !by_name.contains_key(dep) {
                return Err(DecisionError::UnknownKind {
                    kind: name.clone(),
                    dependency: dep.clone(),
                });
            }
            *in_degree.entry(name.clone()).or_insert(0) += 1;
            dependents.entry(dep.clone()).or_default().push(name.clone());
        }
    }

    let mut ready: BTreeSet<String> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| n.clone())
        .collect();
    let mut ordered = Vec::with_capacity(by_name.len());

    while let Some(name) = ready.iter().next().cloned() {
        ready.remove(&name);
        if let Some(consumers) = dependents.get(&name) {
            for consumer in consumers.clone() {
                let degree = in_degree.get_mut(&consumer).expect("kind registered");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(consumer);
                }
            }
        }
        ordered.push(by_name.remove(&name).expect("kind registered"));
    }

    if !by_name.is_empty() {
        let cyclic: Vec<String> = by_name.keys().cloned().collect();
        return Err(DecisionError::KindCycle(cyclic.join(", ")));
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use gantry_platform::{IndexedTask, MemoryIndex, MemoryQueue, RunState, StaticPredictor};
    use std::fs;
    use std::path::PathBuf;

    fn write_tree(root: &Path) {
        fs::write(root.join("run-task"), "#!/bin/sh\nexec \"$@\"\n").unwrap();
        fs::write(
            root.join(GRAPH_CONFIG_FILE),
            r#"
trusted-projects: [integration]
index-prefix: gantry.v2
runner-path: run-task
worker-aliases:
  b-linux:
    provisioner: gantry-prov
    worker-pool: b-linux-large
"#,
        )
        .unwrap();

        let toolchain = root.join("kinds/toolchain");
        fs::create_dir_all(&toolchain).unwrap();
        fs::write(
            toolchain.join("kind.yml"),
            r#"
transforms: [defaults, cached, lower]
task-defaults:
  worker-type: b-linux
  worker:
    implementation: docker
    docker-image: debian12:latest
tasks:
  clang:
    description: clang toolchain
    cache:
      name: clang
      digest-data: [linux64, "13.0"]
"#,
        )
        .unwrap();

        let build = root.join("kinds/build");
        fs::create_dir_all(&build).unwrap();
        fs::write(
            build.join("kind.yml"),
            r#"
transforms: [defaults, lower]
kind-dependencies: [toolchain]
task-defaults:
  worker-type: b-linux
  worker:
    implementation: docker
    docker-image: debian12:latest
tasks:
  linux64/opt:
    description: linux build
    dependencies:
      toolchain: toolchain-clang
"#,
        )
        .unwrap();
    }

    /// Seed a recent, healthy prior backstop so classification comes out
    /// optimized for pushid 41 at push-date 1_700_000_000
    fn seed_recent_backstop(index: &MemoryIndex, queue: &MemoryQueue) {
        index.seed(
            "gantry.v2.branch.integration.latest.backstop",
            IndexedTask {
                task_id: "PriorBackstop1".to_string(),
                expires: Utc::now() + Duration::days(365),
            },
        );
        queue.set_status("PriorBackstop1", RunState::Completed);
        queue.set_artifact(
            "PriorBackstop1",
            gantry_backstop::PARAMETERS_ARTIFACT,
            json!({"push-date": 1_700_000_000i64 - 3_600}),
        );
    }

    fn params() -> Arc<Parameters> {
        Arc::new(
            Parameters::builder()
                .set("project", "integration")
                .set("repository", "https://example.com/repo")
                .set("pushid", 41)
                .set("push-date", 1_700_000_000)
                .set("head-rev", "abcdef123456")
                .set("head-ref", "main")
                .set("level", 3)
                .set("owner", "dev@example.com")
                .build()
                .unwrap(),
        )
    }

    fn decision(queue: Arc<MemoryQueue>, index: Arc<MemoryIndex>) -> Decision {
        Decision::new(queue, index, Arc::new(StaticPredictor::none()))
    }

    #[tokio::test]
    async fn test_end_to_end_run() {
        let temp = tempfile::tempdir().unwrap();
        write_tree(temp.path());
        let queue = Arc::new(MemoryQueue::new());
        let index = Arc::new(MemoryIndex::new());
        let artifacts_dir = temp.path().join("artifacts");

        let generation = decision(queue.clone(), index)
            .run(
                temp.path(),
                params(),
                Some(&artifacts_dir),
                "DecisionTask00",
                None,
            )
            .await
            .unwrap();

        assert_eq!(generation.full_graph.len(), 2);
        // no prior backstop indexed, so the push is a backstop
        assert!(generation.is_backstop);
        assert_eq!(
            generation.created,
            vec!["toolchain-clang", "build-linux64/opt"]
        );

        // the build's dependency was rewritten to the toolchain's id
        let created = queue.created();
        let build_id = &generation.label_to_taskid["build-linux64/opt"];
        let toolchain_id = &generation.label_to_taskid["toolchain-clang"];
        assert_eq!(
            created[build_id]["dependencies"],
            json!([toolchain_id.clone()])
        );

        for name in [
            artifacts::PARAMETERS,
            artifacts::FULL_TASK_GRAPH,
            artifacts::TASK_GRAPH,
            artifacts::LABEL_TO_TASKID,
            artifacts::TO_RUN,
            artifacts::ACTIONS,
        ] {
            assert!(artifacts_dir.join(name).exists(), "missing {name}");
        }
    }

    #[tokio::test]
    async fn test_generation_is_deterministic() {
        let temp = tempfile::tempdir().unwrap();
        write_tree(temp.path());
        let queue = Arc::new(MemoryQueue::new());
        let index = Arc::new(MemoryIndex::new());
        let runner = decision(queue, index);

        let (_, first) = runner.generate_graph(temp.path(), params()).unwrap();
        let (_, second) = runner.generate_graph(temp.path(), params()).unwrap();
        assert_eq!(
            serde_json::to_string(&first.to_json()).unwrap(),
            serde_json::to_string(&second.to_json()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_explicit_targets_restrict_creation() {
        let temp = tempfile::tempdir().unwrap();
        write_tree(temp.path());
        let queue = Arc::new(MemoryQueue::new());
        let index = Arc::new(MemoryIndex::new());

        let params = Arc::new(
            Parameters::builder()
                .set("project", "integration")
                .set("repository", "https://example.com/repo")
                .set("pushid", 41)
                .set("push-date", 1_700_000_000)
                .set("head-rev", "abcdef123456")
                .set("head-ref", "main")
                .set("level", 3)
                .set("owner", "dev@example.com")
                .set("target-labels", json!(["toolchain-clang"]))
                .build()
                .unwrap(),
        );

        let generation = decision(queue.clone(), index)
            .run(temp.path(), params, None, "DecisionTask00", None)
            .await
            .unwrap();

        assert_eq!(generation.created, vec!["toolchain-clang"]);
        assert_eq!(queue.created().len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_targets_never_optimized() {
        let temp = tempfile::tempdir().unwrap();
        write_tree(temp.path());
        let queue = Arc::new(MemoryQueue::new());
        let index = Arc::new(MemoryIndex::new());
        seed_recent_backstop(&index, &queue);

        // index the toolchain's cache at the path its directive resolves to
        let runner = decision(queue.clone(), index.clone());
        let (_, full) = runner.generate_graph(temp.path(), params()).unwrap();
        let cache_path = full
            .get("toolchain-clang")
            .unwrap()
            .optimization
            .as_ref()
            .unwrap()
            .index_path("gantry.v2")
            .unwrap();
        index.seed(
            &cache_path,
            IndexedTask {
                task_id: "PriorToolchain1".to_string(),
                expires: Utc::now() + Duration::days(30),
            },
        );

        let params = Arc::new(
            Parameters::builder()
                .set("project", "integration")
                .set("repository", "https://example.com/repo")
                .set("pushid", 41)
                .set("push-date", 1_700_000_000)
                .set("head-rev", "abcdef123456")
                .set("head-ref", "main")
                .set("level", 3)
                .set("owner", "dev@example.com")
                .set("target-labels", json!(["toolchain-clang"]))
                .build()
                .unwrap(),
        );

        let generation = runner
            .run(temp.path(), params, None, "DecisionTask00", None)
            .await
            .unwrap();

        // a cached but explicitly requested label still runs, even with the
        // default optimize-target-tasks
        assert!(!generation.is_backstop);
        assert_eq!(generation.created, vec!["toolchain-clang"]);
        assert_ne!(
            generation.label_to_taskid["toolchain-clang"],
            "PriorToolchain1"
        );
    }

    #[tokio::test]
    async fn test_backstop_push_ignores_predictor() {
        let temp = tempfile::tempdir().unwrap();
        write_tree(temp.path());
        let queue = Arc::new(MemoryQueue::new());
        let index = Arc::new(MemoryIndex::new());

        // no prior backstop indexed, so the push is a backstop; a predictor
        // claiming nothing is relevant must not shrink its coverage
        let runner = Decision::new(
            queue.clone(),
            index,
            Arc::new(StaticPredictor::with_labels(BTreeSet::new())),
        );
        let generation = runner
            .run(temp.path(), params(), None, "DecisionTask00", None)
            .await
            .unwrap();

        assert!(generation.is_backstop);
        assert_eq!(
            generation.created,
            vec!["toolchain-clang", "build-linux64/opt"]
        );
    }

    #[tokio::test]
    async fn test_predictor_narrows_optimized_push() {
        let temp = tempfile::tempdir().unwrap();
        write_tree(temp.path());
        let queue = Arc::new(MemoryQueue::new());
        let index = Arc::new(MemoryIndex::new());
        seed_recent_backstop(&index, &queue);

        let relevant: BTreeSet<String> = ["toolchain-clang".to_string()].into_iter().collect();
        let runner = Decision::new(
            queue.clone(),
            index,
            Arc::new(StaticPredictor::with_labels(relevant)),
        );
        let generation = runner
            .run(temp.path(), params(), None, "DecisionTask00", None)
            .await
            .unwrap();

        assert!(!generation.is_backstop);
        assert_eq!(generation.created, vec!["toolchain-clang"]);
    }

    #[tokio::test]
    async fn test_sharded_artifacts_combine() {
        let temp = tempfile::tempdir().unwrap();
        write_tree(temp.path());
        let queue = Arc::new(MemoryQueue::new());
        let index = Arc::new(MemoryIndex::new());
        let artifacts_dir = temp.path().join("artifacts");

        decision(queue, index)
            .run(
                temp.path(),
                params(),
                Some(&artifacts_dir),
                "DecisionTask00",
                Some("0"),
            )
            .await
            .unwrap();

        // bookkeeping artifacts carry the shard suffix until combined
        assert!(artifacts_dir.join("task-graph.0.json").exists());
        assert!(!artifacts_dir.join(artifacts::TASK_GRAPH).exists());
        assert!(artifacts_dir.join(artifacts::FULL_TASK_GRAPH).exists());

        crate::artifacts::combine_artifacts(&artifacts_dir).unwrap();
        assert!(artifacts_dir.join(artifacts::TASK_GRAPH).exists());
        assert!(artifacts_dir.join(artifacts::LABEL_TO_TASKID).exists());
        assert!(artifacts_dir.join(artifacts::TO_RUN).exists());
    }

    #[test]
    fn test_sort_kinds_dependencies_first() {
        let kind = |name: &str, deps: &[&str]| KindConfig {
            name: name.to_string(),
            path: PathBuf::from(name),
            transforms: vec!["lower".to_string()],
            kind_dependencies: deps.iter().map(|s| s.to_string()).collect(),
            task_defaults: serde_json::Value::Null,
            tasks: serde_json::Value::Null,
        };

        let ordered = sort_kinds(vec![
            kind("test", &["build"]),
            kind("build", &["toolchain"]),
            kind("toolchain", &[]),
        ])
        .unwrap();
        let names: Vec<_> = ordered.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["toolchain", "build", "test"]);

        let err = sort_kinds(vec![kind("a", &["b"]), kind("b", &["a"])]).unwrap_err();
        assert!(matches!(err, DecisionError::KindCycle(_)));

        let err = sort_kinds(vec![kind("a", &["ghost"])]).unwrap_err();
        assert!(matches!(err, DecisionError::UnknownKind { .. }));
    }
}

//! Gantry Backstop - the full-coverage scheduling heuristic
//!
//! Every push is labelled `backstop` or `optimized`. Backstop pushes generate
//! their graph with optimization disabled, guaranteeing periodic full coverage
//! so cache misses and regressions cannot hide behind optimization forever.

use chrono::Duration;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument};

use gantry_core::{GraphConfig, Parameters};
use gantry_platform::{Index, PlatformError, Queue};

/// Artifact a decision run publishes with its frozen parameters
pub const PARAMETERS_ARTIFACT: &str = "public/parameters.json";

/// Push label for a full-coverage run
pub const BACKSTOP_LABEL: &str = "backstop";
/// Push label for an optimized run
pub const OPTIMIZED_LABEL: &str = "optimized";

/// Errors classifying a push
#[derive(Debug, Error)]
pub enum BackstopError {
    /// A platform lookup failed after retries
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Classification intervals
#[derive(Debug, Clone)]
pub struct BackstopConfig {
    /// Every Nth push of a project is a backstop
    pub push_interval: u64,
    /// Maximum tolerated time since the last known backstop
    pub time_interval: Duration,
}

impl Default for BackstopConfig {
    fn default() -> Self {
        Self {
            push_interval: 20,
            time_interval: Duration::hours(4),
        }
    }
}

/// Human label for a classification
pub fn label(is_backstop: bool) -> &'static str {
    if is_backstop {
        BACKSTOP_LABEL
    } else {
        OPTIMIZED_LABEL
    }
}

/// Index path of a project's most recent backstop decision run
fn backstop_index_path(prefix: &str, project: &str) -> String {
    format!("{prefix}.branch.{project}.latest.backstop")
}

/// Decide whether this push is a backstop.
///
/// A push is a backstop when any of: forced by its parameters; its push id is
/// a multiple of the push interval; its project is outside the trusted set
/// (always backstop, and never the timer reference for other pushes); more
/// than the time interval has passed since the last indexed backstop; or that
/// freshness cannot be proven because the last backstop's own decision run is
/// missing, failed, or excepted.
#[instrument(skip_all, fields(project = params.project(), pushid = params.push_id()))]
pub async fn classify(
    params: &Parameters,
    graph_config: &GraphConfig,
    index: &dyn Index,
    queue: &dyn Queue,
    config: &BackstopConfig,
) -> Result<bool, BackstopError> {
    if params.force_backstop() {
        info!("backstop: forced by parameters");
        return Ok(true);
    }
    if config.push_interval > 0 && params.push_id() % config.push_interval == 0 {
        info!(interval = config.push_interval, "backstop: push interval");
        return Ok(true);
    }
    if !graph_config.is_trusted(params.project()) {
        info!("backstop: untrusted project");
        return Ok(true);
    }

    let path = backstop_index_path(&graph_config.index_prefix, params.project());
    let Some(entry) = index.find_task(&path).await? else {
        info!(path, "backstop: no prior backstop indexed");
        return Ok(true);
    };

    let broken = match queue.status(&entry.task_id).await? {
        Some(status) => status.state.is_broken(),
        None => true,
    };
    if broken {
        // The previous backstop cannot vouch for coverage; rebuild it now
        // rather than let staleness grow unbounded.
        info!(prior = %entry.task_id, "backstop: prior backstop run broken");
        return Ok(true);
    }

    let Some(prior_push_date) = queue
        .artifact_json(&entry.task_id, PARAMETERS_ARTIFACT)
        .await?
        .as_ref()
        .and_then(|p| p.get("push-date"))
        .and_then(Value::as_i64)
    else {
        info!(prior = %entry.task_id, "backstop: prior push date unknown");
        return Ok(true);
    };

    let elapsed = Duration::seconds(params.push_date() - prior_push_date);
    let stale = elapsed > config.time_interval;
    debug!(
        elapsed_seconds = elapsed.num_seconds(),
        stale, "backstop timer check"
    );
    Ok(stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gantry_platform::{IndexedTask, MemoryIndex, MemoryQueue, RunState};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn graph_config() -> GraphConfig {
        GraphConfig {
            trusted_projects: vec!["integration".to_string()],
            index_prefix: "gantry.v2".to_string(),
            worker_aliases: BTreeMap::new(),
            runner_path: None,
            runner_hash: "feedface00".to_string(),
        }
    }

    fn params(project: &str, pushid: u64, push_date: i64) -> Parameters {
        Parameters::builder()
            .set("project", project)
            .set("repository", "https://example.com/repo")
            .set("pushid", pushid)
            .set("push-date", push_date)
            .set("head-rev", "abc")
            .set("head-ref", "main")
            .set("level", 3)
            .set("owner", "dev@example.com")
            .build()
            .unwrap()
    }

    fn seed_backstop(index: &MemoryIndex, queue: &MemoryQueue, state: RunState, push_date: i64) {
        index.seed(
            "gantry.v2.branch.integration.latest.backstop",
            IndexedTask {
                task_id: "PriorBackstop1".to_string(),
                expires: Utc::now() + Duration::days(365),
            },
        );
        queue.set_status("PriorBackstop1", state);
        queue.set_artifact(
            "PriorBackstop1",
            PARAMETERS_ARTIFACT,
            json!({"push-date": push_date}),
        );
    }

    async fn run(params: &Parameters, index: &MemoryIndex, queue: &MemoryQueue) -> bool {
        classify(
            params,
            &graph_config(),
            index,
            queue,
            &BackstopConfig::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_push_interval_forces_backstop() {
        let index = MemoryIndex::new();
        let queue = MemoryQueue::new();
        // pushid 40 with interval 20 is a backstop regardless of elapsed time
        seed_backstop(&index, &queue, RunState::Completed, 1_700_000_000);
        assert!(run(&params("integration", 40, 1_700_000_100), &index, &queue).await);
    }

    #[tokio::test]
    async fn test_untrusted_project_always_backstop() {
        let index = MemoryIndex::new();
        let queue = MemoryQueue::new();
        assert!(run(&params("try", 41, 1_700_000_000), &index, &queue).await);
    }

    #[tokio::test]
    async fn test_recent_backstop_means_optimized() {
        let index = MemoryIndex::new();
        let queue = MemoryQueue::new();
        // one hour ago, within the four-hour window
        seed_backstop(&index, &queue, RunState::Completed, 1_700_000_000);
        assert!(!run(&params("integration", 41, 1_700_003_600), &index, &queue).await);
    }

    #[tokio::test]
    async fn test_stale_backstop_forces_backstop() {
        let index = MemoryIndex::new();
        let queue = MemoryQueue::new();
        // five hours ago
        seed_backstop(&index, &queue, RunState::Completed, 1_700_000_000);
        assert!(run(&params("integration", 41, 1_700_018_000), &index, &queue).await);
    }

    #[tokio::test]
    async fn test_excepted_prior_backstop_forces_backstop() {
        let index = MemoryIndex::new();
        let queue = MemoryQueue::new();
        // recent, but its own run excepted so freshness cannot be proven
        seed_backstop(&index, &queue, RunState::Exception, 1_700_000_000);
        assert!(run(&params("integration", 41, 1_700_000_100), &index, &queue).await);
    }

    #[tokio::test]
    async fn test_no_prior_backstop_forces_backstop() {
        let index = MemoryIndex::new();
        let queue = MemoryQueue::new();
        assert!(run(&params("integration", 41, 1_700_000_000), &index, &queue).await);
    }

    #[tokio::test]
    async fn test_forced_by_parameters() {
        let index = MemoryIndex::new();
        let queue = MemoryQueue::new();
        seed_backstop(&index, &queue, RunState::Completed, 1_700_000_000);
        let params = Parameters::builder()
            .set("project", "integration")
            .set("repository", "https://example.com/repo")
            .set("pushid", 41)
            .set("push-date", 1_700_000_100)
            .set("head-rev", "abc")
            .set("head-ref", "main")
            .set("level", 3)
            .set("owner", "dev@example.com")
            .set("backstop", true)
            .build()
            .unwrap();
        assert!(run(&params, &index, &queue).await);
    }

    #[test]
    fn test_labels() {
        assert_eq!(label(true), BACKSTOP_LABEL);
        assert_eq!(label(false), OPTIMIZED_LABEL);
    }
}

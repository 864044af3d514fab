//! Parallel overlay fetch
//!
//! Earlier action/cron sub-runs of the same push publish their own
//! label→task-id and to-run artifacts; this run merges them in before deciding
//! what still needs creating. The reads are independent and idempotent, so
//! they go through a bounded pool and merge with union-only updates. A 404
//! from one source means "no additional data"; any other transport error
//! aborts the whole generation, since scheduling from an incomplete view is
//! worse than failing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};

use gantry_platform::{PlatformError, Queue};

use crate::error::{DecisionError, Result};

/// Bound on concurrent overlay fetches
pub const OVERLAY_CONCURRENCY: usize = 32;

/// Artifact names overlay sources publish
pub const LABEL_TO_TASKID_ARTIFACT: &str = "public/label-to-taskid.json";
pub const TO_RUN_ARTIFACT: &str = "public/to-run.json";

/// Merged data from every overlay source
#[derive(Debug, Default)]
pub struct OverlayData {
    /// Union of the sources' label→task-id maps
    pub label_to_taskid: BTreeMap<String, String>,
    /// Union of the sources' requested-label lists
    pub to_run: BTreeSet<String>,
}

/// Fetch and merge the overlay artifacts of `source_task_ids`
#[instrument(skip_all, fields(sources = source_task_ids.len()))]
pub async fn fetch_overlays(
    queue: Arc<dyn Queue>,
    source_task_ids: &[String],
) -> Result<OverlayData> {
    let semaphore = Arc::new(Semaphore::new(OVERLAY_CONCURRENCY));
    let mut handles = Vec::with_capacity(source_task_ids.len());

    for task_id in source_task_ids {
        let queue = queue.clone();
        let semaphore = semaphore.clone();
        let task_id = task_id.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("semaphore never closed");
            fetch_one(queue.as_ref(), &task_id).await
        }));
    }

    let mut merged = OverlayData::default();
    for handle in handles {
        let (labels, to_run) = handle
            .await
            .map_err(|e| DecisionError::Overlay(e.to_string()))??;
        merged.label_to_taskid.extend(labels);
        merged.to_run.extend(to_run);
    }

    info!(
        labels = merged.label_to_taskid.len(),
        to_run = merged.to_run.len(),
        "overlays merged"
    );
    Ok(merged)
}

async fn fetch_one(
    queue: &dyn Queue,
    task_id: &str,
) -> std::result::Result<(BTreeMap<String, String>, BTreeSet<String>), PlatformError> {
    let labels = match queue.artifact_json(task_id, LABEL_TO_TASKID_ARTIFACT).await? {
        Some(value) => string_map(&value),
        None => {
            debug!(task_id, "overlay source has no label map");
            BTreeMap::new()
        }
    };
    let to_run = match queue.artifact_json(task_id, TO_RUN_ARTIFACT).await? {
        Some(value) => string_set(&value),
        None => BTreeSet::new(),
    };
    Ok((labels, to_run))
}

fn string_map(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|o| {
            o.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn string_set(value: &Value) -> BTreeSet<String> {
    value
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

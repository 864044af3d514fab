//! In-memory platform doubles
//!
//! Deterministic stand-ins for the queue, index, and predictor, used by tests
//! across the workspace and by the offline `graph` CLI command.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::index::{Index, IndexedTask};
use crate::predictor::RelevancePredictor;
use crate::queue::{Queue, RunState, TaskStatus};

/// In-memory queue
#[derive(Debug, Default)]
pub struct MemoryQueue {
    tasks: Mutex<BTreeMap<String, Value>>,
    statuses: Mutex<BTreeMap<String, RunState>>,
    artifacts: Mutex<BTreeMap<(String, String), Value>>,
}

impl MemoryQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a task status
    pub fn set_status(&self, task_id: &str, state: RunState) {
        self.statuses
            .lock()
            .unwrap()
            .insert(task_id.to_string(), state);
    }

    /// Seed an artifact
    pub fn set_artifact(&self, task_id: &str, name: &str, value: Value) {
        self.artifacts
            .lock()
            .unwrap()
            .insert((task_id.to_string(), name.to_string()), value);
    }

    /// Definitions submitted so far, keyed by task id
    pub fn created(&self) -> BTreeMap<String, Value> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn create_task(&self, task_id: &str, definition: &Value) -> Result<()> {
        self.tasks
            .lock()
            .unwrap()
            .insert(task_id.to_string(), definition.clone());
        self.statuses
            .lock()
            .unwrap()
            .insert(task_id.to_string(), RunState::Pending);
        Ok(())
    }

    async fn status(&self, task_id: &str) -> Result<Option<TaskStatus>> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(task_id)
            .map(|state| TaskStatus {
                task_id: task_id.to_string(),
                state: *state,
            }))
    }

    async fn artifact_json(&self, task_id: &str, name: &str) -> Result<Option<Value>> {
        Ok(self
            .artifacts
            .lock()
            .unwrap()
            .get(&(task_id.to_string(), name.to_string()))
            .cloned())
    }
}

/// In-memory index
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: Mutex<BTreeMap<String, IndexedTask>>,
}

impl MemoryIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry
    pub fn seed(&self, path: &str, entry: IndexedTask) {
        self.entries
            .lock()
            .unwrap()
            .insert(path.to_string(), entry);
    }
}

#[async_trait]
impl Index for MemoryIndex {
    async fn find_task(&self, path: &str) -> Result<Option<IndexedTask>> {
        Ok(self.entries.lock().unwrap().get(path).cloned())
    }

    async fn insert_task(&self, path: &str, entry: &IndexedTask) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(path.to_string(), entry.clone());
        Ok(())
    }
}

/// Predictor double returning a fixed answer
#[derive(Debug, Default)]
pub struct StaticPredictor {
    labels: Option<BTreeSet<String>>,
}

impl StaticPredictor {
    /// Predictor that never has a prediction (run everything)
    pub fn none() -> Self {
        Self { labels: None }
    }

    /// Predictor returning a fixed label set
    pub fn with_labels(labels: BTreeSet<String>) -> Self {
        Self {
            labels: Some(labels),
        }
    }
}

#[async_trait]
impl RelevancePredictor for StaticPredictor {
    async fn relevant_labels(&self, _revision: &str) -> Result<Option<BTreeSet<String>>> {
        Ok(self.labels.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_queue_roundtrip() {
        let queue = MemoryQueue::new();
        queue
            .create_task("abc", &json!({"payload": {}}))
            .await
            .unwrap();

        let status = queue.status("abc").await.unwrap().unwrap();
        assert_eq!(status.state, RunState::Pending);
        assert!(queue.status("missing").await.unwrap().is_none());
        assert_eq!(queue.created().len(), 1);
    }

    #[tokio::test]
    async fn test_artifact_404_is_none() {
        let queue = MemoryQueue::new();
        queue.set_artifact("abc", "public/label-to-taskid.json", json!({"x": "1"}));

        assert!(queue
            .artifact_json("abc", "public/label-to-taskid.json")
            .await
            .unwrap()
            .is_some());
        assert!(queue
            .artifact_json("abc", "public/other.json")
            .await
            .unwrap()
            .is_none());
    }
}

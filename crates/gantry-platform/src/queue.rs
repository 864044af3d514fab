//! Queue client
//!
//! The queue is the execution platform's submission surface: task creation,
//! status lookups, and artifact reads. Payload shapes must exactly match the
//! platform's accepted schema or submission is rejected outright; there is no
//! partial submission.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{PlatformError, Result};
use crate::retry::RetryPolicy;

/// Terminal and in-flight states of a task's latest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Exception,
}

impl RunState {
    /// Whether the run ended without producing a usable result
    pub fn is_broken(&self) -> bool {
        matches!(self, Self::Failed | Self::Exception)
    }
}

/// Status of a submitted task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Task id the status belongs to
    #[serde(rename = "task-id")]
    pub task_id: String,
    /// State of the latest run
    pub state: RunState,
}

/// Execution-platform queue operations
#[async_trait]
pub trait Queue: Send + Sync {
    /// Submit a task under a caller-chosen id
    async fn create_task(&self, task_id: &str, definition: &Value) -> Result<()>;

    /// Status of a task; `None` when the platform does not know the id
    async fn status(&self, task_id: &str) -> Result<Option<TaskStatus>>;

    /// Fetch a JSON artifact of a task; `None` on 404
    async fn artifact_json(&self, task_id: &str, name: &str) -> Result<Option<Value>>;
}

/// HTTP queue client
pub struct HttpQueue {
    client: Client,
    base: Url,
    retry: RetryPolicy,
}

impl HttpQueue {
    /// Create a client against the queue's base URL
    pub fn new(base: Url) -> Self {
        Self {
            client: Client::new(),
            base,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    /// GET a JSON document, mapping 404 to `None`
    async fn get_json(&self, operation: &str, url: Url) -> Result<Option<Value>> {
        self.retry
            .run(operation, || async {
                let response = self.client.get(url.clone()).send().await?;
                if response.status().as_u16() == 404 {
                    return Ok(None);
                }
                if !response.status().is_success() {
                    return Err(PlatformError::Status {
                        operation: operation.to_string(),
                        status: response.status().as_u16(),
                    });
                }
                Ok(Some(response.json::<Value>().await?))
            })
            .await
    }
}

#[async_trait]
impl Queue for HttpQueue {
    async fn create_task(&self, task_id: &str, definition: &Value) -> Result<()> {
        let url = self.endpoint(&format!("task/{task_id}"))?;
        debug!(task_id, "creating task");
        self.retry
            .run("create-task", || async {
                let response = self
                    .client
                    .put(url.clone())
                    .json(definition)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(PlatformError::Status {
                        operation: "create-task".to_string(),
                        status: response.status().as_u16(),
                    });
                }
                Ok(())
            })
            .await
    }

    async fn status(&self, task_id: &str) -> Result<Option<TaskStatus>> {
        let url = self.endpoint(&format!("task/{task_id}/status"))?;
        let Some(body) = self.get_json("status", url).await? else {
            return Ok(None);
        };
        let status =
            serde_json::from_value(body).map_err(|source| PlatformError::Decode {
                operation: "status".to_string(),
                source,
            })?;
        Ok(Some(status))
    }

    async fn artifact_json(&self, task_id: &str, name: &str) -> Result<Option<Value>> {
        let url = self.endpoint(&format!("task/{task_id}/artifacts/{name}"))?;
        self.get_json("artifact", url).await
    }
}

//! Index client
//!
//! The index maps deterministic namespace paths to previously created tasks.
//! It is the basis of "materialize at most once per unique cache key": there
//! is no locking, only lookup, and racing generations may both create the same
//! entry; the index's own consistency tolerates that.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{PlatformError, Result};
use crate::retry::RetryPolicy;

/// A task published under an index path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedTask {
    /// Execution id of the indexed task
    #[serde(rename = "task-id")]
    pub task_id: String,
    /// When this entry stops being valid
    pub expires: DateTime<Utc>,
}

impl IndexedTask {
    /// Whether the entry is still valid at `now`
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires > now
    }
}

/// Execution-platform index operations
#[async_trait]
pub trait Index: Send + Sync {
    /// Look up the task published under `path`; `None` on 404
    async fn find_task(&self, path: &str) -> Result<Option<IndexedTask>>;

    /// Publish a task under `path`
    async fn insert_task(&self, path: &str, entry: &IndexedTask) -> Result<()>;
}

/// HTTP index client
pub struct HttpIndex {
    client: Client,
    base: Url,
    retry: RetryPolicy,
}

impl HttpIndex {
    /// Create a client against the index's base URL
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
}

#[async_trait]
impl Index for HttpIndex {
    async fn find_task(&self, path: &str) -> Result<Option<IndexedTask>> {
        let url = self.base.join(&format!("task/{path}"))?;
        debug!(path, "index lookup");
        self.retry
            .run("find-task", || async {
                let response = self.client.get(url.clone()).send().await?;
                if response.status().as_u16() == 404 {
                    return Ok(None);
                }
                if !response.status().is_success() {
                    return Err(PlatformError::Status {
                        operation: "find-task".to_string(),
                        status: response.status().as_u16(),
                    });
                }
                let entry =
                    response
                        .json::<IndexedTask>()
                        .await
                        .map_err(PlatformError::Http)?;
                Ok(Some(entry))
            })
            .await
    }

    async fn insert_task(&self, path: &str, entry: &IndexedTask) -> Result<()> {
        let url = self.base.join(&format!("task/{path}"))?;
        self.retry
            .run("insert-task", || async {
                let response = self.client.put(url.clone()).json(entry).send().await?;
                if !response.status().is_success() {
                    return Err(PlatformError::Status {
                        operation: "insert-task".to_string(),
                        status: response.status().as_u16(),
                    });
                }
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_entry_validity() {
        let now = Utc::now();
        let live = IndexedTask {
            task_id: "abc".to_string(),
            expires: now + Duration::hours(1),
        };
        let expired = IndexedTask {
            task_id: "def".to_string(),
            expires: now - Duration::hours(1),
        };
        assert!(live.is_valid(now));
        assert!(!expired.is_valid(now));
    }
}

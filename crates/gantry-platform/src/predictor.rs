//! Relevance predictor client
//!
//! An external service predicts which labels a revision actually affects. The
//! prediction is advisory: a call exceeding its timeout budget degrades to
//! "treat everything as needing to run" rather than blocking or guessing.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::error::{PlatformError, Result};

/// Predicts the set of labels relevant to a revision
#[async_trait]
pub trait RelevancePredictor: Send + Sync {
    /// Labels relevant to `revision`; `None` means no prediction, run
    /// everything
    async fn relevant_labels(&self, revision: &str) -> Result<Option<BTreeSet<String>>>;
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    labels: Vec<String>,
}

/// HTTP predictor client with a hard timeout budget
pub struct HttpPredictor {
    client: Client,
    base: Url,
    budget: Duration,
}

impl HttpPredictor {
    /// Default timeout budget for one prediction call
    pub const DEFAULT_BUDGET: Duration = Duration::from_secs(30);

    /// Create a client against the predictor's base URL
    pub fn new(base: Url) -> Self {
        Self {
            client: Client::new(),
            base,
            budget: Self::DEFAULT_BUDGET,
        }
    }

    /// Override the timeout budget
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    async fn fetch(&self, revision: &str) -> Result<Option<BTreeSet<String>>> {
        let url = self.base.join(&format!("push/{revision}/labels"))?;
        let response = self.client.get(url).send().await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(PlatformError::Status {
                operation: "predict".to_string(),
                status: response.status().as_u16(),
            });
        }
        let prediction = response
            .json::<PredictionResponse>()
            .await
            .map_err(PlatformError::Http)?;
        Ok(Some(prediction.labels.into_iter().collect()))
    }
}

#[async_trait]
impl RelevancePredictor for HttpPredictor {
    async fn relevant_labels(&self, revision: &str) -> Result<Option<BTreeSet<String>>> {
        match tokio::time::timeout(self.budget, self.fetch(revision)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    revision,
                    budget_secs = self.budget.as_secs(),
                    "prediction timed out, running everything"
                );
                Ok(None)
            }
        }
    }
}

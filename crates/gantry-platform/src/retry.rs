//! Bounded retry with exponential backoff

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{PlatformError, Result};

/// Retry policy for platform calls that can legitimately stall
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: usize,
    /// Delay before the first retry; doubles per further retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only transient errors (transport failures, 5xx, 429) are retried.
    pub async fn run<T, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.base_delay;
        let mut last: Option<PlatformError> = None;

        for attempt in 1..=self.attempts.max(1) {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    warn!(operation, attempt, error = %e, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    last = Some(e);
                }
                Err(e) if e.is_transient() => {
                    return Err(PlatformError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: self.attempts,
                        last: e.to_string(),
                    })
                }
                Err(e) => return Err(e),
            }
        }

        Err(PlatformError::RetriesExhausted {
            operation: operation.to_string(),
            attempts: self.attempts,
            last: last.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

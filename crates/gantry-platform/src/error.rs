//! Platform client errors

use thiserror::Error;

/// Result type alias using PlatformError
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Errors talking to the execution platform
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status (404 never reaches here; it maps to `Ok(None)`)
    #[error("{operation} returned HTTP {status}")]
    Status { operation: String, status: u16 },

    /// Response body could not be decoded
    #[error("cannot decode {operation} response: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    /// Retries exhausted for a stalling call
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: usize,
        last: String,
    },

    /// Malformed base URL or path
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl PlatformError {
    /// Whether retrying can plausibly help
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

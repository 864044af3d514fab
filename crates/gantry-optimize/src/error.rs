//! Optimization errors

use thiserror::Error;

use gantry_graph::GraphError;
use gantry_platform::PlatformError;

/// Convenience alias
pub type Result<T> = std::result::Result<T, OptimizeError>;

/// Errors during the optimization pass
#[derive(Debug, Error)]
pub enum OptimizeError {
    /// A platform lookup failed after retries
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Rebuilding the optimized graph failed
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A task carries a directive with no registered strategy
    #[error("task '{label}' uses unregistered optimization strategy '{strategy}'")]
    UnknownStrategy { label: String, strategy: String },
}

//! Decision errors

use thiserror::Error;

use gantry_backstop::BackstopError;
use gantry_core::CoreError;
use gantry_graph::{GraphError, VerificationError};
use gantry_optimize::OptimizeError;
use gantry_platform::PlatformError;
use gantry_transforms::TransformError;

/// Convenience alias
pub type Result<T> = std::result::Result<T, DecisionError>;

/// Errors during a decision run
#[derive(Debug, Error)]
pub enum DecisionError {
    /// Configuration or parameter loading failed
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A transform pipeline rejected a record
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Graph construction failed
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The full graph failed verification
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// The optimization pass failed
    #[error(transparent)]
    Optimize(#[from] OptimizeError),

    /// Backstop classification failed
    #[error(transparent)]
    Backstop(#[from] BackstopError),

    /// A platform call failed after retries
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Artifact I/O failed
    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact content could not be encoded or decoded
    #[error("artifact serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Kind dependencies form a cycle
    #[error("kind dependency cycle among: {0}")]
    KindCycle(String),

    /// A kind depends on a kind that does not exist
    #[error("kind '{kind}' depends on unknown kind '{dependency}'")]
    UnknownKind { kind: String, dependency: String },

    /// A dependency cannot be rewritten to a task id
    #[error("task '{label}' depends on '{target}' which has no assigned task id")]
    MissingDependency { label: String, target: String },

    /// An overlay fetch worker panicked or was cancelled
    #[error("overlay fetch failed: {0}")]
    Overlay(String),
}

//! Lowering errors

use thiserror::Error;

use gantry_core::{KeyedByError, SchemaError};

/// Errors lowering a task description into a platform payload
#[derive(Debug, Error)]
pub enum LoweringError {
    /// The worker stanza failed its implementation schema
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Worker-type alias resolution failed
    #[error(transparent)]
    KeyedBy(#[from] KeyedByError),

    /// No builder is registered for the worker implementation
    #[error("task '{label}' names unknown worker implementation '{implementation}'")]
    UnknownImplementation {
        label: String,
        implementation: String,
    },

    /// No alias of this name exists in the graph configuration
    #[error("task '{label}' names unknown worker-type alias '{alias}'")]
    UnknownWorkerType { label: String, alias: String },

    /// The task description is structurally unusable
    #[error("cannot lower task '{label}': {message}")]
    Invalid { label: String, message: String },
}

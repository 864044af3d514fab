//! Transform pipeline errors

use thiserror::Error;

use gantry_core::{KeyedByError, SchemaError};

/// Errors raised while running a kind's pipeline
#[derive(Debug, Error)]
pub enum TransformError {
    /// A record failed schema validation; carries every violation at once
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Keyed-value resolution failed for a record field
    #[error(transparent)]
    KeyedBy(#[from] KeyedByError),

    /// A stage rejected a record
    #[error("transform '{stage}' rejected {item}: {message}")]
    Invalid {
        stage: &'static str,
        item: String,
        message: String,
    },

    /// A kind named a stage that was never registered
    #[error("kind '{kind}' references unknown transform stage '{stage}'")]
    UnknownStage { kind: String, stage: String },
}

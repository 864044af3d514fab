//! Error types for Gantry core

use std::path::PathBuf;

use thiserror::Error;

use crate::schema::Violation;

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Main error type for core operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Keyed-value resolution errors
    #[error(transparent)]
    KeyedBy(#[from] KeyedByError),

    /// Schema validation errors
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// Missing required field
    #[error("Missing required configuration field: {0}")]
    MissingField(String),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the keyed-value resolver
#[derive(Debug, Error)]
pub enum KeyedByError {
    /// `by-<attribute>` body was not a mapping
    #[error("value of {field} keyed by '{attribute}' in {item} is not a mapping")]
    NotAMapping {
        field: String,
        attribute: String,
        item: String,
    },

    /// The context did not supply the keying attribute
    #[error(
        "no value for attribute '{attribute}' while resolving {field} in {item}; \
         available context: {available}"
    )]
    MissingContext {
        field: String,
        attribute: String,
        item: String,
        available: String,
    },

    /// No arm matched and no default arm exists
    #[error(
        "no arm of {field} keyed by '{attribute}' in {item} matches '{value}' \
         and no default is given; patterns: {patterns}"
    )]
    NoMatch {
        field: String,
        attribute: String,
        item: String,
        value: String,
        patterns: String,
    },

    /// More than one arm matched under single-match enforcement
    #[error(
        "multiple arms of {field} keyed by '{attribute}' in {item} match '{value}': {patterns}"
    )]
    MultipleMatches {
        field: String,
        attribute: String,
        item: String,
        value: String,
        patterns: String,
    },

    /// An arm pattern was not a valid regular expression
    #[error("invalid pattern '{pattern}' for {field} in {item}: {message}")]
    BadPattern {
        field: String,
        item: String,
        pattern: String,
        message: String,
    },
}

/// Schema validation failure for one record, carrying every violation found
#[derive(Debug, Error)]
#[error("schema '{schema}' rejected {ident}: {}", format_violations(.violations))]
pub struct SchemaError {
    /// Name of the schema that rejected the record
    pub schema: String,
    /// Label, name, or primary dependency identifying the record
    pub ident: String,
    /// All violations found, not just the first
    pub violations: Vec<Violation>,
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

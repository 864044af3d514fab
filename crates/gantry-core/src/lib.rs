//! Gantry Core - foundational types for task-graph generation
//!
//! This crate provides the run parameters, the keyed-value resolver,
//! declarative schema validation, and configuration loading shared by
//! every other Gantry crate.

pub mod config;
pub mod error;
pub mod keyed_by;
pub mod parameters;
pub mod schema;

pub use config::{GraphConfig, KindConfig};
pub use error::{ConfigError, CoreError, KeyedByError, Result, SchemaError};
pub use keyed_by::resolve_keyed_by;
pub use parameters::{Parameters, ParametersBuilder};
pub use schema::{FieldType, Schema, Violation};

//! Gantry Transforms - the per-kind transform pipeline
//!
//! Each kind owns an ordered list of pure stages. A stage receives the kind's
//! immutable [`TransformConfig`] and a lazy sequence of task-description
//! records and yields a lazy sequence of records; downstream stages may fail
//! fast, so stages never force full materialization internally.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod task;
pub mod validate;

pub use config::TransformConfig;
pub use error::TransformError;
pub use pipeline::{
    map_records, run_pipeline, Record, RecordStream, Transform, TransformRegistry,
};
pub use task::{into_task, Cached, Defaults, Display, ResolveKeyed, RunOnProjects};
pub use validate::Validate;

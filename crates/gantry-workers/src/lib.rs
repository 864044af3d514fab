//! Gantry Workers - worker payload lowering
//!
//! A fixed registry maps a worker-implementation discriminant to a
//! (schema, builder) pair, resolved at process start-up. Builders receive the
//! generic lowered skeleton and produce the implementation-specific execution
//! payload, appending whatever scopes and cache mounts their features require.

pub mod alias;
pub mod docker;
pub mod error;
pub mod generic;
pub mod lower;
pub mod registry;
pub mod scopes;
pub mod script;

pub use alias::{resolve_worker_type, WorkerTarget};
pub use error::LoweringError;
pub use lower::Lower;
pub use registry::{PayloadBuilder, PayloadRegistry};
pub use scopes::{CacheMount, CapabilityAccumulator};

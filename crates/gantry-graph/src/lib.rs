//! Gantry Graph - the task graph data model
//!
//! Tasks, the immutable task graph with its derived edge relation, cache
//! digests, and the whole-graph verification pass.

pub mod digest;
pub mod graph;
pub mod task;
pub mod verify;

pub use digest::CacheDigest;
pub use graph::{GraphError, TaskGraph};
pub use task::{OptimizationDirective, Task, MAX_DEPENDENCIES};
pub use verify::{verify_graph, VerificationError};

/// Well-known dependency name for the base execution image; tasks consuming it
/// receive a trust-chain input annotation at creation time
pub const DOCKER_IMAGE_DEP: &str = "docker-image";

/// Reserved cache-name family for runner-managed caches
pub const RUN_CACHE_PREFIX: &str = "gantry-run-";

/// Reserved cache-name family for version-control checkout caches
pub const VCS_CACHE_PREFIX: &str = "gantry-vcs-";

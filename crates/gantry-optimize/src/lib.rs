//! Gantry Optimize - cache-driven graph optimization
//!
//! Rewrites the full graph to skip nodes whose output already exists: an
//! `IndexSearch` directive is resolved against the platform index, and when a
//! live, usable prior execution is found the node is replaced by a reference
//! to its id. "Materialize at most once per cache key" comes from the index
//! lookup alone; there is no locking, and racing generations are tolerated.

pub mod error;
pub mod pass;
pub mod strategy;

pub use error::{OptimizeError, Result};
pub use pass::{optimize_graph, OptimizedGraph};
pub use strategy::{IndexSearchStrategy, OptimizationStrategy, StrategyRegistry};

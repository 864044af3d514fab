//! Gantry Decision - end-to-end graph generation and submission
//!
//! The decision run is the engine's entry point: it reads the kind tree, runs
//! each kind's transform pipeline, assembles and verifies the full graph,
//! decides backstop vs optimized, prunes cached work, and submits the
//! remaining closure to the execution platform, persisting its bookkeeping as
//! artifacts along the way.

pub mod actions;
pub mod artifacts;
pub mod create;
pub mod error;
pub mod generator;
pub mod ids;
pub mod overlay;

pub use create::create_tasks;
pub use error::{DecisionError, Result};
pub use generator::{Decision, Generation};
pub use ids::new_task_id;
pub use overlay::{fetch_overlays, OverlayData};

//! Exit codes for the CLI

#![allow(dead_code)]

use gantry_decision::DecisionError;

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Graph construction or verification error
pub const GRAPH_ERROR: i32 = 3;

/// Execution-platform error
pub const PLATFORM_ERROR: i32 = 4;

/// Exit code for a top-level error
pub fn for_error(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<DecisionError>() {
        Some(DecisionError::Core(_)) => CONFIG_ERROR,
        Some(DecisionError::KindCycle(_) | DecisionError::UnknownKind { .. }) => CONFIG_ERROR,
        Some(
            DecisionError::Graph(_)
            | DecisionError::Verification(_)
            | DecisionError::Transform(_)
            | DecisionError::MissingDependency { .. },
        ) => GRAPH_ERROR,
        Some(
            DecisionError::Platform(_) | DecisionError::Overlay(_) | DecisionError::Backstop(_),
        ) => PLATFORM_ERROR,
        _ => ERROR,
    }
}

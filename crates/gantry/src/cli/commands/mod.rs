//! CLI command implementations

mod actions;
mod combine;
mod decision;
mod graph;

pub use actions::ActionsCommand;
pub use combine::CombineCommand;
pub use decision::DecisionCommand;
pub use graph::GraphCommand;

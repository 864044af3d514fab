//! CLI definition and command handling

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use commands::{ActionsCommand, CombineCommand, DecisionCommand, GraphCommand};

/// Gantry - CI task-graph generation, optimization, and submission
#[derive(Debug, Parser)]
#[command(name = "gantry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a full decision: generate, optimize, and submit the task graph
    Decision(DecisionCommand),

    /// Generate and print the task graph without touching the platform
    Graph(GraphCommand),

    /// Combine sharded decision artifacts into their canonical files
    Combine(CombineCommand),

    /// Print the action manifest for a run
    Actions(ActionsCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(&self) -> anyhow::Result<()> {
        match &self.command {
            Commands::Decision(cmd) => cmd.execute(self),
            Commands::Graph(cmd) => cmd.execute(self),
            Commands::Combine(cmd) => cmd.execute(self),
            Commands::Actions(cmd) => cmd.execute(self),
        }
    }
}

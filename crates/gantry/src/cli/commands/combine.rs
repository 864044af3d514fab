//! The `combine` command: merge sharded decision artifacts

use std::path::PathBuf;

use clap::Args;

use gantry_decision::artifacts::combine_artifacts;

use crate::cli::{output, Cli};

/// Combine sharded decision artifacts into their canonical files
#[derive(Debug, Args)]
pub struct CombineCommand {
    /// Directory holding the sharded artifacts
    #[arg(default_value = "artifacts")]
    pub dir: PathBuf,
}

impl CombineCommand {
    /// Execute the command
    pub fn execute(&self, _cli: &Cli) -> anyhow::Result<()> {
        combine_artifacts(&self.dir)?;
        output::success(&format!("combined artifacts in {}", self.dir.display()));
        Ok(())
    }
}

//! The `actions` command: print the action manifest

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use gantry_core::Parameters;
use gantry_decision::{actions::action_manifest, new_task_id};

use crate::cli::Cli;

/// Print the action manifest for a run
#[derive(Debug, Args)]
pub struct ActionsCommand {
    /// Run parameters file
    #[arg(short, long, default_value = "parameters.yml")]
    pub parameters: PathBuf,

    /// The decision task id the actions refer back to
    #[arg(long, env = "GANTRY_TASK_ID")]
    pub task_id: Option<String>,
}

impl ActionsCommand {
    /// Execute the command
    pub fn execute(&self, _cli: &Cli) -> anyhow::Result<()> {
        let params = Parameters::from_yaml_file(&self.parameters)
            .with_context(|| format!("loading {}", self.parameters.display()))?;
        let decision_id = self.task_id.clone().unwrap_or_else(new_task_id);
        let manifest = action_manifest(&params, &decision_id);
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        Ok(())
    }
}

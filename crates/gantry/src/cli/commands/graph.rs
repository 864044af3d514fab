//! The `graph` command: offline graph generation

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;

use gantry_core::Parameters;
use gantry_decision::Decision;
use gantry_platform::{MemoryIndex, MemoryQueue, StaticPredictor};

use crate::cli::{output, Cli};

/// Generate and verify the full graph without touching the platform
#[derive(Debug, Args)]
pub struct GraphCommand {
    /// Graph root containing gantry.yml and kinds/
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Run parameters file
    #[arg(short, long, default_value = "parameters.yml")]
    pub parameters: PathBuf,

    /// Write the graph here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print labels only, one per line
    #[arg(long)]
    pub labels: bool,
}

impl GraphCommand {
    /// Execute the command
    pub fn execute(&self, _cli: &Cli) -> anyhow::Result<()> {
        let params = Arc::new(
            Parameters::from_yaml_file(&self.parameters)
                .with_context(|| format!("loading {}", self.parameters.display()))?,
        );

        let runner = Decision::new(
            Arc::new(MemoryQueue::new()),
            Arc::new(MemoryIndex::new()),
            Arc::new(StaticPredictor::none()),
        );
        let (_, graph) = runner.generate_graph(&self.root, params)?;

        if self.labels {
            for label in graph.labels() {
                println!("{label}");
            }
            return Ok(());
        }

        let rendered = serde_json::to_string_pretty(&graph.to_json())?;
        match &self.output {
            Some(path) => {
                std::fs::write(path, rendered)
                    .with_context(|| format!("writing {}", path.display()))?;
                output::success(&format!(
                    "wrote {} tasks to {}",
                    graph.len(),
                    path.display()
                ));
            }
            None => println!("{rendered}"),
        }
        Ok(())
    }
}

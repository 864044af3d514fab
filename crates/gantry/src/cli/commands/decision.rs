//! The `decision` command: one full generation run

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use url::Url;

use gantry_core::Parameters;
use gantry_decision::{new_task_id, Decision};
use gantry_platform::{HttpIndex, HttpPredictor, HttpQueue, RelevancePredictor, StaticPredictor};

use crate::cli::{output, Cli};

/// Run a full decision
#[derive(Debug, Args)]
pub struct DecisionCommand {
    /// Graph root containing gantry.yml and kinds/
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Run parameters file
    #[arg(short, long, default_value = "parameters.yml")]
    pub parameters: PathBuf,

    /// Directory for decision artifacts
    #[arg(long, default_value = "artifacts")]
    pub artifacts: PathBuf,

    /// This decision run's own task id; generated when absent
    #[arg(long, env = "GANTRY_TASK_ID")]
    pub task_id: Option<String>,

    /// Shard suffix for the bookkeeping artifacts when one logical run is
    /// split across invocations; combine the shards afterwards with
    /// `gantry combine`
    #[arg(long, env = "GANTRY_SHARD")]
    pub shard: Option<String>,

    /// Queue base URL
    #[arg(long, env = "GANTRY_QUEUE_URL")]
    pub queue_url: Url,

    /// Index base URL
    #[arg(long, env = "GANTRY_INDEX_URL")]
    pub index_url: Url,

    /// Relevance predictor base URL; everything runs when absent
    #[arg(long, env = "GANTRY_PREDICTOR_URL")]
    pub predictor_url: Option<Url>,
}

impl DecisionCommand {
    /// Execute the command
    pub fn execute(&self, _cli: &Cli) -> anyhow::Result<()> {
        let params = Arc::new(
            Parameters::from_yaml_file(&self.parameters)
                .with_context(|| format!("loading {}", self.parameters.display()))?,
        );
        let decision_id = self.task_id.clone().unwrap_or_else(new_task_id);

        let queue = Arc::new(HttpQueue::new(self.queue_url.clone()));
        let index = Arc::new(HttpIndex::new(self.index_url.clone()));
        let predictor: Arc<dyn RelevancePredictor> = match &self.predictor_url {
            Some(url) => Arc::new(HttpPredictor::new(url.clone())),
            None => Arc::new(StaticPredictor::none()),
        };

        let runner = Decision::new(queue, index, predictor);
        let generation = tokio::runtime::Runtime::new()?.block_on(runner.run(
            &self.root,
            params,
            Some(&self.artifacts),
            &decision_id,
            self.shard.as_deref(),
        ))?;

        let classification = if generation.is_backstop {
            "backstop"
        } else {
            "optimized"
        };
        output::info(&format!("push classified as {classification}"));
        println!("{}", output::key_value("tasks", &generation.full_graph.len().to_string()));
        println!(
            "{}",
            output::key_value("created", &generation.created.len().to_string())
        );
        output::success(&format!(
            "decision complete, artifacts in {}",
            self.artifacts.display()
        ));
        Ok(())
    }
}

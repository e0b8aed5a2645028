use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use stepflow_core::{DependencyStrategy, ParallelExecutor};

mod config;
mod runner;
mod workflow_file;

use config::{CliConfig, Overrides};
use runner::CommandStepExecutor;

#[derive(Parser, Debug)]
#[command(name = "stepflow")]
#[command(about = "Parallel step scheduler for agent workflows", long_about = None)]
struct Args {
    /// Workflow definition (.yaml, .yml, .toml or .json)
    workflow: PathBuf,

    /// Path to configuration file
    #[arg(short, long, default_value = "stepflow.toml")]
    config: PathBuf,

    /// Maximum number of steps running at once
    #[arg(short = 'j', long, env = "STEPFLOW_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Run steps one at a time in declaration order
    #[arg(long)]
    sequential: bool,

    /// Wall-clock budget for the whole run
    #[arg(long, env = "STEPFLOW_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// How dependencies between steps are determined
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Print per-step results as JSON instead of the summary
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    Heuristic,
    Declared,
}

impl From<Strategy> for DependencyStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Heuristic => DependencyStrategy::Heuristic,
            Strategy::Declared => DependencyStrategy::Declared,
        }
    }
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            max_concurrency: self.max_concurrency,
            sequential: self.sequential,
            timeout_secs: self.timeout_secs,
            strategy: self.strategy.map(Into::into),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stepflow=info".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let cli_config = CliConfig::load(&args.config)?;
    let workflow = workflow_file::load(&args.workflow)?;
    let config = cli_config.resolve(&workflow, &args.overrides());

    let executor = ParallelExecutor::new(config).context("Invalid executor configuration")?;
    let runner = Arc::new(CommandStepExecutor::new(cli_config.runner.command.clone()));

    if runner.is_simulated() {
        tracing::info!("No runner command configured, simulating steps");
    }
    tracing::info!(run_id = %executor.run_id(), "Running workflow '{}'", workflow.name);

    let outcome = executor.execute(runner, &workflow.steps).await;
    executor.cleanup();

    // Partial results are reported even when the run failed
    if args.json {
        let results: BTreeMap<_, _> = executor.results().await.into_iter().collect();
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("{}", executor.summary().await);
    }

    outcome.context("Workflow execution failed")?;

    Ok(())
}

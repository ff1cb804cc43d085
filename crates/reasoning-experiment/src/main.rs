//! Reasoning Experiment CLI.
//!
//! Commands:
//! - run: Run every query in an experiment file
//! - demo: Run the built-in scenarios

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use reasoning_experiment::experiment::{ExperimentFile, ExperimentRunner, ExperimentRunnerConfig};
use reasoning_experiment::results::RunSummary;
use reasoning_experiment::scenarios;

/// Generate a timestamped output path from the given path.
/// e.g., "results.json" -> "results-20260108-010530.json"
fn timestamped_path(path: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("results");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}-{}.{}", stem, timestamp, ext))
}

#[derive(Parser)]
#[command(name = "reasoning-experiment")]
#[command(version)]
#[command(about = "Backward-chaining resolution over actors")]
struct Cli {
    /// Longest a single pull may take (milliseconds)
    #[arg(long, env = "REASONING_PULL_TIMEOUT_MS", default_value = "10000")]
    pull_timeout_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every query in an experiment file
    Run {
        /// Experiment file (JSON)
        #[arg(long)]
        program: PathBuf,

        /// Output file for results
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run the built-in demo scenarios
    Demo {
        /// Only run the named scenario
        #[arg(long)]
        scenario: Option<String>,

        /// Output file for results
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn write_output(summary: &RunSummary, output: Option<&Path>) -> Result<()> {
    if let Some(output) = output {
        let output_path = timestamped_path(output);
        summary.save(&output_path)?;
        println!("Results saved to: {}", output_path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runner = ExperimentRunner::new(ExperimentRunnerConfig {
        pull_timeout: Duration::from_millis(cli.pull_timeout_ms),
    });

    match cli.command {
        Commands::Run { program, output } => {
            info!(program = %program.display(), "Loading experiment");
            let experiment = ExperimentFile::load(&program)?;
            let summary = runner.run(&experiment).await?;
            summary.print();
            write_output(&summary, output.as_deref())?;
        }

        Commands::Demo { scenario, output } => {
            let selected: Vec<_> = scenarios::all()
                .into_iter()
                .filter(|(name, _)| scenario.as_deref().map_or(true, |wanted| wanted == *name))
                .collect();
            if selected.is_empty() {
                anyhow::bail!(
                    "unknown scenario {:?}; expected one of pipeline, disjunction, recursion-dedup, recursion-bounded",
                    scenario.unwrap_or_default()
                );
            }

            for (name, experiment) in selected {
                info!(scenario = name, "Running scenario");
                let summary = runner.run(&experiment).await?;
                summary.print();

                // One file per scenario: "out.json" -> "pipeline-out-<timestamp>.json"
                let scenario_output = output.as_ref().map(|path| {
                    let file = path
                        .file_name()
                        .and_then(|s| s.to_str())
                        .unwrap_or("results.json");
                    path.with_file_name(format!("{}-{}", name, file))
                });
                write_output(&summary, scenario_output.as_deref())?;
            }
        }
    }

    Ok(())
}

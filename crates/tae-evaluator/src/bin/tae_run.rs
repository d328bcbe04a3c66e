/// Target algorithm runner
///
/// Evaluates one run request against a scenario and prints the recorded run
/// as JSON on stdout. Logs go to stderr.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tae_evaluator::{CommandLineEvaluator, EvaluationSession};
use tae_types::{RunRequest, ScenarioConfig, TaeError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code used when the target algorithm reported ABORT.
const EXIT_ABORTED: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "tae-run")]
#[command(about = "Run a target algorithm once and report the result", long_about = None)]
struct Args {
    /// Scenario file (JSON)
    scenario: PathBuf,

    /// Run request file (JSON)
    request: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let scenario = ScenarioConfig::from_file(&args.scenario)
        .with_context(|| format!("Failed to load scenario '{}'", args.scenario.display()))?;
    let raw = std::fs::read_to_string(&args.request)
        .with_context(|| format!("Failed to read run request '{}'", args.request.display()))?;
    let request: RunRequest = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse run request '{}'", args.request.display()))?;

    let evaluator = CommandLineEvaluator::new(scenario.clone())?;
    let session = EvaluationSession::new(Arc::new(evaluator), scenario)?;

    let outcome = session.evaluate(request).await;
    if let Some(value) = session.history().last() {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }

    match outcome {
        Ok(_) => Ok(()),
        Err(TaeError::Aborted { reason }) => {
            tracing::error!("Target algorithm aborted: {reason}");
            std::process::exit(EXIT_ABORTED);
        }
        Err(e) => Err(e.into()),
    }
}

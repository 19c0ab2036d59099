use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use council_cli::config::{CouncilConfig, CONFIG_ENV};
use council_cli::telemetry::TelemetryReader;
use council_router::{
    Complexity, RiskLevel, RouteOptions, TaskCategory, TaskClassifier, TierOptions,
};
use serde_json::json;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "council", version, about = "Route tasks across local and premium LLM backends")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the category a task would be routed under
    Classify {
        /// Task text, or "-" to read stdin
        task: String,
    },
    /// Route through tier 0, escalating to tier 1 on failure
    Route {
        /// Task text, or "-" to read stdin
        task: String,
        /// Highest tier to use (0 disables escalation)
        #[arg(long)]
        max_tier: Option<u8>,
        /// Skip classification
        #[arg(long)]
        task_type: Option<TaskCategory>,
        #[arg(long, default_value = "low")]
        risk: RiskLevel,
        #[arg(long)]
        consensus: bool,
        #[arg(long, default_value = "medium")]
        complexity: Complexity,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        max_tokens: Option<u32>,
    },
    /// Route across all backends without tiering
    Direct {
        /// Task text, or "-" to read stdin
        task: String,
        #[arg(long)]
        task_type: Option<TaskCategory>,
        #[arg(long)]
        consensus: bool,
        /// Consensus participants (at least 2)
        #[arg(long)]
        threshold: Option<usize>,
        #[arg(long, default_value = "medium")]
        complexity: Complexity,
    },
    /// Show backends, health and telemetry totals
    Status,
}

fn read_task(arg: &str) -> Result<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut task = String::new();
    std::io::stdin()
        .read_to_string(&mut task)
        .context("Failed to read task from stdin")?;
    Ok(task.trim().to_string())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = CouncilConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Classify { task } => {
            let task = read_task(&task)?;
            let category = TaskClassifier::from_config(&config.router).classify(&task);
            print_json(&json!({ "task_category": category }))?;
        }
        Command::Route {
            task,
            max_tier,
            task_type,
            risk,
            consensus,
            complexity,
            temperature,
            max_tokens,
        } => {
            let task = read_task(&task)?;
            let escalator = council_cli::build_escalator(&config)?;
            let options = TierOptions {
                task_type,
                risk_level: risk,
                max_tier,
                require_consensus: consensus,
                complexity,
                temperature,
                max_tokens,
            };

            let result = escalator.route(&task, &options).await;
            if !result.success {
                warn!(category = %result.task_category, "Task was not answered");
            }
            print_json(&json!({
                "result": result,
                "stats": escalator.stats(),
            }))?;
        }
        Command::Direct {
            task,
            task_type,
            consensus,
            threshold,
            complexity,
        } => {
            let task = read_task(&task)?;
            let router = council_cli::build_router(&config)?;
            let options = RouteOptions {
                category: task_type,
                require_consensus: consensus,
                consensus_threshold: threshold,
                complexity,
                ..Default::default()
            };
            let result = router.route_task(&task, &options).await;
            print_json(&result)?;
        }
        Command::Status => {
            let router = council_cli::build_router(&config)?;
            let backends: Vec<_> = config
                .backends
                .iter()
                .map(|(id, spec)| {
                    json!({
                        "id": id,
                        "provider": spec.provider,
                        "model": spec.model,
                        "tier": spec.tier,
                        "cost_per_million": spec.cost_per_million,
                        "api_key_set": spec.api_key_env.is_none() || spec.api_key().is_some(),
                    })
                })
                .collect();

            let telemetry = match &config.telemetry_path {
                Some(path) if path.exists() => match TelemetryReader::read_from_file(path) {
                    Ok(reader) => Some(reader.summarize()),
                    Err(e) => {
                        warn!(path = %path.display(), "Failed to read telemetry: {e}");
                        None
                    }
                },
                _ => None,
            };

            info!(backends = backends.len(), "Council status");
            print_json(&json!({
                "backends": backends,
                "router": router.status(),
                "telemetry": telemetry,
            }))?;
        }
    }

    Ok(())
}

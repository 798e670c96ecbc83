//! `ensemble` command-line front end for the orchestrator.

use clap::{Parser, Subcommand};
use ensemble_core::Task;
use ensemble_orchestrator::{EnsembleConfig, OrchestrateOptions, Orchestrator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ensemble", about = "Ensemble: multi-worker content generation")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "ensemble.toml")]
    config: PathBuf,

    /// Human-readable logs instead of JSON
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Orchestrate a task and print the synthesized output
    Run {
        /// Task definition (JSON)
        #[arg(short, long)]
        task: PathBuf,
        /// Execute subtasks one at a time
        #[arg(long)]
        sequential: bool,
        /// Override the configured concurrency bound
        #[arg(long)]
        max_concurrency: Option<usize>,
        /// Cap every per-assignment timeout, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Log progress events as they arrive
        #[arg(long)]
        stream: bool,
    },
    /// Print the decomposition and routing of a task without executing it
    Plan {
        /// Task definition (JSON)
        #[arg(short, long)]
        task: PathBuf,
    },
    /// Check orchestrator and worker health
    Health,
    /// List the built-in capability catalog
    Capabilities,
}

fn init_tracing(pretty: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if pretty {
        builder.init();
    } else {
        builder.json().init();
    }
}

async fn load_config(path: &Path) -> anyhow::Result<EnsembleConfig> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(EnsembleConfig::default());
    }
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        anyhow::anyhow!("Failed to read config file '{}': {e}", path.display())
    })?;
    Ok(EnsembleConfig::from_toml_str(&raw)?)
}

async fn load_task(path: &Path) -> anyhow::Result<Task> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read task file '{}': {e}", path.display()))?;
    Ok(serde_json::from_str(&raw)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.pretty);

    let config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Run {
            task,
            sequential,
            max_concurrency,
            timeout_ms,
            stream,
        } => {
            let task = load_task(&task).await?;
            let task_id = task.id;
            let orchestrator = Arc::new(Orchestrator::from_config(config)?);

            if stream {
                let mut events = orchestrator.subscribe();
                tokio::spawn(async move {
                    while let Ok(event) = events.recv().await {
                        if event.task_id() != task_id {
                            continue;
                        }
                        match serde_json::to_value(&event) {
                            Ok(value) => info!(event = %value, "Progress"),
                            Err(e) => warn!(error = %e, "Unserializable progress event"),
                        }
                    }
                });
            }

            let interrupt = {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!(task_id = %task_id, "Interrupted, cancelling session");
                        if let Err(e) = orchestrator.cancel(task_id).await {
                            warn!(error = %e, "Cancel failed");
                        }
                    }
                })
            };

            let options = OrchestrateOptions {
                max_concurrency,
                timeout: timeout_ms.map(Duration::from_millis),
                parallel: !sequential,
                stream_progress: stream,
            };
            info!(task_id = %task_id, task_type = ?task.task_type, "Starting orchestration");
            let result = orchestrator.orchestrate(task, options).await;
            interrupt.abort();

            match result {
                Ok(output) => println!("{}", serde_json::to_string_pretty(&output)?),
                Err(e) => {
                    if let Ok(report) = orchestrator.report(task_id).await {
                        eprintln!("{}", serde_json::to_string_pretty(&report)?);
                    }
                    return Err(anyhow::anyhow!("{}: {e}", e.code()));
                }
            }
        }
        Commands::Plan { task } => {
            let task = load_task(&task).await?;
            let orchestrator = Orchestrator::from_config(config)?;
            let plan = orchestrator.plan(&task)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Health => {
            let base_url = config.worker.base_url.clone();
            let orchestrator = Orchestrator::from_config(config)?;
            let health = orchestrator.health().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
            if !health.healthy {
                anyhow::bail!("worker at '{base_url}' is unhealthy");
            }
        }
        Commands::Capabilities => {
            let orchestrator = Orchestrator::from_config(config)?;
            let registry = orchestrator.registry();
            println!("Built-in capabilities:");
            for def in registry.list() {
                println!(
                    "  {:<20} {:<10} {}",
                    def.id.as_str(),
                    format!("{:?}", def.category).to_lowercase(),
                    def.description
                );
                if !def.strengths.is_empty() {
                    println!("    strengths: {}", def.strengths.join(", "));
                }
            }
            println!("\nTotal: {} capability(ies)", registry.len());
        }
    }

    Ok(())
}

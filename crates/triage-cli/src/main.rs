//! Triage command line.
//!
//! Classifies text through the full cascade, probes backend health, and
//! prints the effective configuration. Logs go to stderr so stdout stays
//! machine-readable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use triage_core::ClassificationRequest;
use triage_runtime::{ClassificationOrchestrator, RuntimeConfig};

/// Cascading intent classification.
#[derive(Parser, Debug)]
#[command(name = "triage", version, about, long_about = None)]
struct Cli {
    /// YAML configuration file. Defaults apply when omitted.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a piece of text and print the result as JSON.
    Classify {
        text: String,

        /// Caller identity recorded in the classification event
        #[arg(long)]
        subject: Option<String>,

        /// Override the request deadline, e.g. `500ms`
        #[arg(long, value_parser = humantime::parse_duration)]
        deadline: Option<Duration>,

        #[arg(long)]
        pretty: bool,
    },

    /// Probe every tier backend and print breaker state.
    Health,

    /// Print the validated configuration as YAML.
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
    let mut config = match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("Invalid TRIAGE_* environment override")?;
    config.validate().context("Invalid configuration")?;
    tracing::debug!(path = ?path, version = %config.version_tag(), "Configuration loaded");
    Ok(config)
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Classify {
            text,
            subject,
            deadline,
            pretty,
        } => {
            let budget = deadline.unwrap_or(config.request_deadline);
            let orchestrator = ClassificationOrchestrator::builder()
                .config(config)
                .build()
                .context("Failed to start classifier")?;

            let mut request = ClassificationRequest::new(text);
            if let Some(subject) = subject {
                request = request.with_subject(subject);
            }
            tracing::debug!(request_id = %request.request_id, budget = ?budget, "Classifying");

            let result = orchestrator
                .classify_with_deadline(&request, budget)
                .await
                .context("Classification failed")?;
            println!("{}", to_json(&result, pretty)?);
        }
        Commands::Health => {
            let orchestrator = ClassificationOrchestrator::builder()
                .config(config)
                .build()
                .context("Failed to start classifier")?;
            let report = orchestrator.health().await;
            let unreachable = report.tiers.iter().filter(|t| !t.reachable).count();
            if unreachable > 0 {
                tracing::warn!(unreachable, "Some tier backends did not answer the health probe");
            }
            println!("{}", to_json(&report, true)?);
        }
        Commands::Config => {
            print!("{}", config.to_yaml()?);
        }
    }

    Ok(())
}

//! Tier controller CLI
//!
//! Inspects the tier catalog, scores telemetry offline, fetches live
//! telemetry, shows a service's live tier and checks a running
//! controller's health.

mod client;
mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{plan, score, status, telemetry, tiers};
use controller_lib::ControllerConfig;
use std::path::PathBuf;

const DEFAULT_CONTROLLER_URL: &str = "http://localhost:8080";

/// Tier controller CLI
#[derive(Parser)]
#[command(name = "tierctl")]
#[command(author, version, about = "CLI for the tier autoscaling controller", long_about = None)]
pub struct Cli {
    /// Controller endpoint URL (can also be set via TIER_CONTROLLER_URL env var)
    #[arg(long, env = "TIER_CONTROLLER_URL")]
    pub controller_url: Option<String>,

    /// Controller configuration file (TOML, YAML or JSON)
    #[arg(long, env = "TIER_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the tier catalog
    Tiers,

    /// Score a set of means and show the policy decision
    Score {
        /// Mean request latency in milliseconds
        #[arg(long)]
        latency_ms: f64,

        /// Mean error count per sample
        #[arg(long, default_value = "0")]
        errors: f64,

        /// Mean CPU utilisation in percent
        #[arg(long, default_value = "50")]
        cpu: f64,
    },

    /// Fetch one telemetry window and show per-service utility
    Telemetry {
        /// Window length in seconds (defaults to the configured window)
        #[arg(long)]
        window: Option<u64>,
    },

    /// Show a service's live tier and its neighbours in the catalog
    Plan {
        /// Deployment name
        service: String,

        /// Utility reading to plan against
        #[arg(long, requires = "cpu")]
        utility: Option<f64>,

        /// CPU reading in percent to plan against
        #[arg(long, requires = "utility")]
        cpu: Option<f64>,
    },

    /// Show health and readiness of a running controller
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let defaults = config::CliConfig::load()?;

    let config_file = cli.config.or(defaults.controller_config);
    if cli.verbose {
        match &config_file {
            Some(path) => output::print_info(&format!("Using configuration {}", path.display())),
            None => output::print_info("Using built-in configuration"),
        }
    }
    let config = ControllerConfig::load(config_file.as_deref())
        .context("Failed to load controller configuration")?;

    match cli.command {
        Commands::Tiers => {
            tiers::show_tiers(&config, cli.format)?;
        }
        Commands::Score {
            latency_ms,
            errors,
            cpu,
        } => {
            score::show_score(&config, latency_ms, errors, cpu, cli.format)?;
        }
        Commands::Telemetry { window } => {
            telemetry::show_telemetry(&config, window, cli.format).await?;
        }
        Commands::Plan {
            service,
            utility,
            cpu,
        } => {
            let reading = utility.zip(cpu);
            plan::show_plan(
                &config,
                cli.kubeconfig.as_deref(),
                &service,
                reading,
                cli.format,
            )
            .await?;
        }
        Commands::Status => {
            let url = cli
                .controller_url
                .or(defaults.controller_url)
                .unwrap_or_else(|| DEFAULT_CONTROLLER_URL.to_string());
            let client = client::ControllerClient::new(&url)?;
            status::show_status(&client, cli.format).await?;
        }
    }

    Ok(())
}

//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use controller_lib::scaling::{is_max_utility, Decision, ScalePolicy};
use controller_lib::{ResourceTier, ScaleDirection};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a table, or as a JSON array
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&items),
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => print_error(&format!("Failed to serialize output: {}", e)),
    }
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Where a utility sits relative to the scaling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtilityBand {
    Max,
    Healthy,
    Degraded,
}

pub fn utility_band(utility: f64, policy: &ScalePolicy) -> UtilityBand {
    if is_max_utility(utility) {
        UtilityBand::Max
    } else if utility >= policy.upscale_below_utility {
        UtilityBand::Healthy
    } else {
        UtilityBand::Degraded
    }
}

/// Utility with two decimals, colored by its band under `policy`
pub fn color_utility(utility: f64, policy: &ScalePolicy) -> String {
    let formatted = format!("{:.2}", utility);
    match utility_band(utility, policy) {
        UtilityBand::Max => formatted.green().to_string(),
        UtilityBand::Healthy => formatted.yellow().to_string(),
        UtilityBand::Degraded => formatted.red().to_string(),
    }
}

/// Color health status strings
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" | "not ready" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Short label for a policy decision
pub fn decision_label(decision: &Decision) -> String {
    match decision {
        Decision::Scale(ScaleDirection::Up, reason) => format!("scale up ({})", reason),
        Decision::Scale(ScaleDirection::Down, reason) => format!("scale down ({})", reason),
        Decision::Hold(reason) => format!("hold ({})", reason),
    }
}

/// Render an optional target tier
pub fn format_target(target: Option<ResourceTier>) -> String {
    match target {
        Some(tier) => tier.to_string(),
        None => "-".to_string(),
    }
}

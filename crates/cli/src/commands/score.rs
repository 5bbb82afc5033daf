//! Offline utility scoring

use anyhow::{bail, Result};
use colored::Colorize;
use controller_lib::scaling::{error_preference, latency_preference, ScalePlanner, UtilityScorer};
use controller_lib::{ControllerConfig, ServiceMeans};
use serde::Serialize;

use crate::output::{color_utility, decision_label, print_json, OutputFormat};

#[derive(Debug, Serialize)]
pub struct ScoreReport {
    pub latency_ms: f64,
    pub error_count: f64,
    pub cpu_percent: f64,
    pub latency_preference: f64,
    pub error_preference: f64,
    pub utility: f64,
    pub decision: String,
}

/// Score one set of means with the configured weights and policy
pub fn score(
    config: &ControllerConfig,
    latency_ms: f64,
    error_count: f64,
    cpu_percent: f64,
) -> Result<ScoreReport> {
    for (name, value) in [
        ("latency", latency_ms),
        ("errors", error_count),
        ("cpu", cpu_percent),
    ] {
        if !value.is_finite() || value < 0.0 {
            bail!("{} must be a non-negative number, got {}", name, value);
        }
    }

    let means = ServiceMeans {
        latency_ms,
        error_count,
        cpu_percent,
        memory_percent: 0.0,
    };
    let utility = UtilityScorer::new(config.utility).utility(&means);
    let decision = ScalePlanner::new(config.policy).decide(utility, cpu_percent);

    Ok(ScoreReport {
        latency_ms,
        error_count,
        cpu_percent,
        latency_preference: latency_preference(latency_ms),
        error_preference: error_preference(error_count),
        utility,
        decision: decision_label(&decision),
    })
}

pub fn show_score(
    config: &ControllerConfig,
    latency_ms: f64,
    error_count: f64,
    cpu_percent: f64,
    format: OutputFormat,
) -> Result<()> {
    let report = score(config, latency_ms, error_count, cpu_percent)?;

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => {
            println!("{}", "Utility Score".bold());
            println!("{}", "=".repeat(40));
            println!(
                "Latency:   {:>8.1} ms  (preference {:.1}, weight {:.2})",
                report.latency_ms, report.latency_preference, config.utility.latency
            );
            println!(
                "Errors:    {:>8.1}     (preference {:.1}, weight {:.2})",
                report.error_count, report.error_preference, config.utility.error_rate
            );
            println!("CPU:       {:>8.1} %", report.cpu_percent);
            println!();
            println!("Utility:   {}", color_utility(report.utility, &config.policy));
            println!("Decision:  {}", report.decision.cyan());
        }
    }

    Ok(())
}

//! One-shot telemetry fetch

use anyhow::{anyhow, Context, Result};
use controller_lib::scaling::{ScalePlanner, UtilityScorer};
use controller_lib::telemetry::{QueryWindow, SysdigClient, TelemetryFetcher};
use controller_lib::ControllerConfig;
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;

use crate::output::{
    color_utility, decision_label, print_info, print_table, print_warning, OutputFormat,
};

#[derive(Tabled, Serialize)]
struct TelemetryRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Latency (ms)")]
    latency_ms: String,
    #[tabled(rename = "Errors")]
    errors: String,
    #[tabled(rename = "CPU %")]
    cpu_percent: String,
    #[tabled(rename = "Mem %")]
    memory_percent: String,
    #[tabled(rename = "Utility")]
    utility: String,
    #[tabled(rename = "Decision")]
    decision: String,
}

impl TelemetryRow {
    fn missing(service: &str) -> Self {
        let dash = || "-".to_string();
        Self {
            service: service.to_string(),
            latency_ms: dash(),
            errors: dash(),
            cpu_percent: dash(),
            memory_percent: dash(),
            utility: dash(),
            decision: "no telemetry".to_string(),
        }
    }
}

/// The configured window, or one reaching `window_secs` into the past
fn query_window(configured: QueryWindow, window_secs: Option<u64>) -> Result<QueryWindow> {
    let window = match window_secs {
        Some(secs) => {
            let start_offset_secs = i64::try_from(secs)
                .map(|secs| -secs)
                .map_err(|_| anyhow!("Window of {}s is too large", secs))?;
            QueryWindow {
                start_offset_secs,
                ..configured
            }
        }
        None => configured,
    };
    window.validate().context("Invalid query window")?;
    Ok(window)
}

/// Fetch one window and show what the controller would decide
pub async fn show_telemetry(
    config: &ControllerConfig,
    window_secs: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let window = query_window(config.window, window_secs)?;

    let client = SysdigClient::new(config.telemetry.clone())?;
    let fetcher = TelemetryFetcher::new(Arc::new(client), config.metric_groups(), window);
    let snapshot = fetcher.snapshot().await;

    for failure in snapshot.failures() {
        print_warning(&format!(
            "Metric group '{}' failed: {}",
            failure.group, failure.error
        ));
    }

    let scorer = UtilityScorer::new(config.utility);
    let planner = ScalePlanner::new(config.policy);
    let seen = snapshot.services();

    let rows: Vec<TelemetryRow> = config
        .services
        .iter()
        .map(|service| match snapshot.means_for(service) {
            Some(means) if seen.contains(service) => {
                let utility = scorer.utility(&means);
                let decision = planner.decide(utility, means.cpu_percent);
                TelemetryRow {
                    service: service.clone(),
                    latency_ms: format!("{:.1}", means.latency_ms),
                    errors: format!("{:.1}", means.error_count),
                    cpu_percent: format!("{:.1}", means.cpu_percent),
                    memory_percent: format!("{:.1}", means.memory_percent),
                    utility: match format {
                        OutputFormat::Table => color_utility(utility, &config.policy),
                        OutputFormat::Json => format!("{:.2}", utility),
                    },
                    decision: decision_label(&decision),
                }
            }
            _ => TelemetryRow::missing(service),
        })
        .collect();

    print_table(&rows, format);

    if let OutputFormat::Table = format {
        print_info(&format!(
            "Window: last {}s in {}s samples, namespace {}",
            window.start_offset_secs.unsigned_abs(),
            window.sampling_secs,
            config.namespace
        ));
    }

    Ok(())
}

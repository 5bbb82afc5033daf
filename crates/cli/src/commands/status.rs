//! Controller status

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use serde_json::json;
use tabled::Tabled;

use crate::client::ControllerClient;
use crate::output::{color_status, print_json, print_warning, OutputFormat};

#[derive(Tabled, Serialize)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
}

/// Show health and readiness of a running controller
pub async fn show_status(client: &ControllerClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.readiness().await?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "health": health.body,
            "readiness": readiness.body,
        })),
        OutputFormat::Table => {
            let overall = format!("{:?}", health.body.status).to_lowercase();
            let ready = if readiness.body.ready { "ready" } else { "not ready" };

            println!("{}", "Controller Status".bold());
            println!("{}", "=".repeat(60));
            println!("Health:    {}", color_status(&overall));
            println!("Readiness: {}", color_status(ready));
            if let Some(reason) = &readiness.body.reason {
                print_warning(reason);
            }
            println!();

            let mut rows: Vec<ComponentRow> = health
                .body
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&format!("{:?}", component.status).to_lowercase()),
                    message: component.message.clone().unwrap_or_default(),
                    last_check: format_timestamp(component.last_check_timestamp),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

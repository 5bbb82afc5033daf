//! Tier catalog listing

use anyhow::Result;
use controller_lib::ControllerConfig;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_info, print_table, OutputFormat};

#[derive(Tabled, Serialize)]
struct TierRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Replicas")]
    replicas: u32,
}

/// List the configured tiers, smallest first
pub fn show_tiers(config: &ControllerConfig, format: OutputFormat) -> Result<()> {
    let catalog = config.tier_catalog()?;

    let rows: Vec<TierRow> = catalog
        .tiers()
        .iter()
        .enumerate()
        .map(|(idx, named)| TierRow {
            position: idx + 1,
            name: named.name.clone(),
            cpu: named.tier.cpu_quantity(),
            memory: named.tier.memory_quantity(),
            replicas: named.tier.replicas,
        })
        .collect();

    print_table(&rows, format);

    if let OutputFormat::Table = format {
        let largest = catalog.largest();
        print_info(&format!(
            "Past {} replicas double at {}/{}; unknown configurations scale down by halving",
            largest.name,
            largest.tier.cpu_quantity(),
            largest.tier.memory_quantity()
        ));
    }

    Ok(())
}

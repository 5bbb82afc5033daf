//! Subcommand implementations

pub mod plan;
pub mod score;
pub mod status;
pub mod telemetry;
pub mod tiers;

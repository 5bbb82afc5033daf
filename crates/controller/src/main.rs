//! Tier Controller - closed-loop resource tier autoscaler
//!
//! Runs as a single Deployment, scoring each managed service from telemetry
//! and moving it one resource tier at a time.

use anyhow::{Context, Result};
use controller_lib::{
    control::ControlLoopBuilder,
    executor::KubeDeployments,
    health::{components, HealthRegistry},
    observability::{ControllerMetrics, StructuredLogger},
    telemetry::SysdigClient,
    ControllerConfig,
};
use std::sync::Arc;
use tier_controller::{api, settings::ServerSettings};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting tier-controller");

    let settings = ServerSettings::load()?;
    let config = ControllerConfig::load(settings.config_file.as_deref())
        .context("Failed to load controller configuration")?;
    info!(
        namespace = %config.namespace,
        services = ?config.services,
        "Controller configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::TELEMETRY).await;
    health_registry.register(components::DEPLOYMENTS).await;

    let metrics = ControllerMetrics::new();
    let logger = StructuredLogger::new(&config.namespace);

    let telemetry = Arc::new(SysdigClient::new(config.telemetry.clone())?);
    let deployments = Arc::new(KubeDeployments::try_default(&config.namespace).await?);

    let control_loop = ControlLoopBuilder::new()
        .config(config)
        .telemetry(telemetry)
        .deployments(deployments)
        .health(health_registry.clone())
        .build()?;

    logger.log_startup(
        CONTROLLER_VERSION,
        control_loop.services().len(),
        control_loop.catalog().len(),
    );

    let app_state = Arc::new(api::AppState::new(health_registry, metrics));
    let api_handle = tokio::spawn(api::serve(settings.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(control_loop.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    if shutdown_tx.send(()).is_err() {
        warn!("Control loop already stopped");
    }
    // An in-flight iteration completes before the loop exits
    loop_handle.await.context("Control loop task failed")?;
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

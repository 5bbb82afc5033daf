//! Control loop driver
//!
//! Bootstraps every service to the smallest tier, waits for the settle
//! delay, then iterates until shut down. Iterations never overlap; the
//! shutdown signal is honoured between iterations and during sleeps.

use super::{IterationReport, PacingConfig, ServiceOutcome};
use crate::config::ControllerConfig;
use crate::error::ApplyError;
use crate::executor::{ApplyOutcome, DeploymentClient, ScaleExecutor};
use crate::health::{components, HealthRegistry};
use crate::models::{ScaleDirection, ServiceMeans, ServiceObservation};
use crate::observability::{ControllerMetrics, StructuredLogger};
use crate::scaling::{PlanOutcome, ScalePlanner, TierCatalog, UtilityScorer};
use crate::telemetry::{TelemetryFetcher, TelemetrySnapshot, TelemetrySource};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Tier autoscaling control loop
pub struct ControlLoop {
    services: Vec<String>,
    fetcher: TelemetryFetcher,
    scorer: UtilityScorer,
    planner: ScalePlanner,
    catalog: TierCatalog,
    executor: ScaleExecutor,
    pacing: PacingConfig,
    health: HealthRegistry,
    metrics: ControllerMetrics,
    logger: StructuredLogger,
}

impl ControlLoop {
    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Run until `shutdown` fires or its sender is dropped
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            services = self.services.len(),
            settle_secs = self.pacing.settle_secs,
            "Starting control loop"
        );

        self.health.register(components::CONTROL_LOOP).await;
        self.bootstrap().await;
        self.health.set_ready(true).await;

        if self.pause(self.pacing.settle(), &mut shutdown).await {
            loop {
                let report = self.run_iteration().await;
                let pacing = report.pacing();
                let delay = self.pacing.delay(pacing);

                debug!(
                    pacing = ?pacing,
                    applied = report.applied().count(),
                    delay_secs = delay.as_secs(),
                    "Iteration complete"
                );

                if !self.pause(delay, &mut shutdown).await {
                    break;
                }
            }
        }

        self.health.set_ready(false).await;
        self.health
            .set_unhealthy(components::CONTROL_LOOP, "control loop stopped")
            .await;
        info!("Control loop stopped");
    }

    /// Sleep for `duration`; false if shutdown was requested meanwhile
    async fn pause(&self, duration: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                info!("Shutting down control loop");
                false
            }
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Set every service to the smallest tier
    ///
    /// Failures are logged and returned; they never stop the loop.
    pub async fn bootstrap(&self) -> Vec<ApplyError> {
        let initial = self.catalog.smallest().tier;
        let mut failures = Vec::new();

        for service in &self.services {
            match self.executor.apply(service, &initial).await {
                Ok(_) => self.metrics.set_service_replicas(service, initial.replicas),
                Err(e) => failures.push(e),
            }
        }

        self.logger.log_bootstrap(
            &initial,
            self.services.len() - failures.len(),
            failures.len(),
        );
        failures
    }

    /// One full pass: fetch, score, plan and apply for every service
    pub async fn run_iteration(&self) -> IterationReport {
        let started = Instant::now();
        let snapshot = self.fetcher.snapshot().await;
        self.record_telemetry_health(&snapshot).await;

        let seen = snapshot.services();
        let mut report = IterationReport::default();

        for service in &self.services {
            let outcome = match snapshot.means_for(service) {
                Some(means) if seen.contains(service) => {
                    let utility = self.scorer.utility(&means);
                    self.metrics.set_service_utility(service, utility);
                    self.evaluate(service, means, utility).await
                }
                _ => {
                    self.logger
                        .log_hold(service, None, None, None, NO_TELEMETRY_REASON);
                    ServiceOutcome::NoTelemetry
                }
            };
            report.push(service, outcome);
        }

        if report.deployment_failures() == 0 {
            self.health.set_healthy(components::DEPLOYMENTS).await;
        } else {
            self.health
                .set_degraded(
                    components::DEPLOYMENTS,
                    format!("{} services failed to read or apply", report.deployment_failures()),
                )
                .await;
        }
        self.health.set_healthy(components::CONTROL_LOOP).await;
        self.metrics
            .observe_iteration(started.elapsed().as_secs_f64());

        report
    }

    async fn evaluate(
        &self,
        service: &str,
        means: ServiceMeans,
        utility: f64,
    ) -> ServiceOutcome {
        let live = match self.executor.live(service).await {
            Ok(live) => live,
            Err(e) => {
                warn!(service = %service, error = %e, "Failed to read live configuration");
                self.logger.log_hold(
                    service,
                    None,
                    Some(utility),
                    Some(means.cpu_percent),
                    READ_FAILED_REASON,
                );
                return ServiceOutcome::ReadFailed(e.to_string());
            }
        };
        self.metrics.set_service_replicas(service, live.replicas);

        let observation = ServiceObservation {
            service: service.to_string(),
            means,
            utility,
            live,
        };

        let current = live.tier();
        let plan = match self.planner.plan(&observation, &self.catalog) {
            PlanOutcome::Apply(plan) => plan,
            PlanOutcome::Hold(reason) => {
                self.logger.log_hold(
                    service,
                    Some(&current),
                    Some(utility),
                    Some(means.cpu_percent),
                    reason.as_str(),
                );
                return ServiceOutcome::Held(reason);
            }
            PlanOutcome::AtBound(direction) => {
                debug!(
                    service = %service,
                    tier = %self.catalog.describe(&current),
                    "No tier beyond current one"
                );
                self.logger.log_hold(
                    service,
                    Some(&current),
                    Some(utility),
                    Some(means.cpu_percent),
                    bound_reason(direction),
                );
                return ServiceOutcome::AtBound(direction);
            }
        };

        self.logger.log_decision(&plan);

        match self.executor.apply(service, &plan.to).await {
            Ok(ApplyOutcome::Committed) => {
                self.metrics.inc_scale_action(plan.direction);
                self.metrics.set_service_replicas(service, plan.to.replicas);
                self.logger.log_applied(&plan);
                ServiceOutcome::Applied(plan)
            }
            Ok(ApplyOutcome::Unchanged) => ServiceOutcome::Unchanged(plan),
            Err(e) => {
                self.metrics.inc_apply_errors();
                let error = e.to_string();
                self.logger.log_apply_failed(&plan, &error);
                ServiceOutcome::ApplyFailed { plan, error }
            }
        }
    }

    async fn record_telemetry_health(&self, snapshot: &TelemetrySnapshot) {
        for failure in snapshot.failures() {
            self.metrics.inc_fetch_errors(&failure.group);
            self.logger.log_fetch_failed(&failure.group, &failure.error);
        }

        if snapshot.failures().is_empty() {
            self.health.set_healthy(components::TELEMETRY).await;
        } else {
            self.health
                .set_degraded(
                    components::TELEMETRY,
                    format!("failed groups: {}", snapshot.failed_groups().join(", ")),
                )
                .await;
        }
    }
}

const NO_TELEMETRY_REASON: &str = "no_telemetry";
const READ_FAILED_REASON: &str = "live_read_failed";

fn bound_reason(direction: ScaleDirection) -> &'static str {
    match direction {
        ScaleDirection::Up => "at_ceiling",
        ScaleDirection::Down => "at_floor",
    }
}

/// Builder for the control loop
pub struct ControlLoopBuilder {
    config: ControllerConfig,
    telemetry: Option<Arc<dyn TelemetrySource>>,
    deployments: Option<Arc<dyn DeploymentClient>>,
    health: HealthRegistry,
}

impl ControlLoopBuilder {
    pub fn new() -> Self {
        Self {
            config: ControllerConfig::default(),
            telemetry: None,
            deployments: None,
            health: HealthRegistry::new(),
        }
    }

    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pacing(mut self, pacing: PacingConfig) -> Self {
        self.config.pacing = pacing;
        self
    }

    pub fn telemetry(mut self, source: Arc<dyn TelemetrySource>) -> Self {
        self.telemetry = Some(source);
        self
    }

    pub fn deployments(mut self, client: Arc<dyn DeploymentClient>) -> Self {
        self.deployments = Some(client);
        self
    }

    /// Share a health registry with the API server
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn build(self) -> Result<ControlLoop> {
        let telemetry = self
            .telemetry
            .ok_or_else(|| anyhow::anyhow!("Telemetry source is required"))?;
        let deployments = self
            .deployments
            .ok_or_else(|| anyhow::anyhow!("Deployment client is required"))?;

        self.config.validate()?;
        let catalog = self.config.tier_catalog()?;

        Ok(ControlLoop {
            fetcher: TelemetryFetcher::new(
                telemetry,
                self.config.metric_groups(),
                self.config.window,
            ),
            scorer: UtilityScorer::new(self.config.utility),
            planner: ScalePlanner::new(self.config.policy),
            catalog,
            executor: ScaleExecutor::new(deployments),
            pacing: self.config.pacing,
            health: self.health,
            metrics: ControllerMetrics::new(),
            logger: StructuredLogger::new(&self.config.namespace),
            services: self.config.services,
        })
    }
}

impl Default for ControlLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

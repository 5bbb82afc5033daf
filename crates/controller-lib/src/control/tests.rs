//! Control loop tests against in-memory telemetry and deployments

use super::*;
use crate::config::ControllerConfig;
use crate::error::{DeploymentError, FetchError};
use crate::executor::{ApplyOutcome, DeploymentClient};
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::observability::capture::CapturedEvents;
use crate::models::{LiveConfiguration, ResourceTier};
use crate::telemetry::{DataPoint, MetricGroup, QueryWindow, TelemetryResponse, TelemetrySource};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

const AUTH: &str = "acmeair-authservice";
const BOOKING: &str = "acmeair-bookingservice";
const FLIGHT: &str = "acmeair-flightservice";

const C1: ResourceTier = ResourceTier::new(250, 250, 1);
const C2: ResourceTier = ResourceTier::new(250, 500, 1);
const C3: ResourceTier = ResourceTier::new(250, 500, 2);

/// One iteration's worth of backend responses, keyed by group name
type Round = HashMap<String, Result<Vec<Value>, u16>>;

/// Telemetry backend replaying scripted rounds; the last round repeats
struct ScriptedTelemetry {
    rounds: Mutex<VecDeque<Round>>,
    last: Mutex<Round>,
    calls: AtomicUsize,
}

impl ScriptedTelemetry {
    fn new(rounds: Vec<Round>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            last: Mutex::new(Round::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TelemetrySource for ScriptedTelemetry {
    async fn fetch(
        &self,
        group: &MetricGroup,
        _window: &QueryWindow,
    ) -> Result<TelemetryResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        // Both groups of an iteration share one round
        if group.name == "standard" {
            if let Some(round) = self.rounds.lock().unwrap().pop_front() {
                *self.last.lock().unwrap() = round;
            }
        }

        match self.last.lock().unwrap().get(&group.name) {
            Some(Ok(rows)) => Ok(TelemetryResponse {
                data: rows
                    .iter()
                    .map(|row| DataPoint {
                        t: 0,
                        d: row.as_array().cloned().unwrap_or_default(),
                    })
                    .collect(),
            }),
            Some(Err(status)) => Err(FetchError::Backend {
                status: *status,
                body: "{\"message\":\"unavailable\"}".to_string(),
            }),
            None => Ok(TelemetryResponse::default()),
        }
    }
}

/// Deployments held in memory; named services reject writes
struct InMemoryDeployments {
    live: Mutex<HashMap<String, LiveConfiguration>>,
    rejecting: HashSet<String>,
    writes: AtomicUsize,
}

impl InMemoryDeployments {
    fn new(services: &[(&str, ResourceTier)]) -> Self {
        Self {
            live: Mutex::new(
                services
                    .iter()
                    .map(|(name, tier)| (name.to_string(), LiveConfiguration::from_tier(tier)))
                    .collect(),
            ),
            rejecting: HashSet::new(),
            writes: AtomicUsize::new(0),
        }
    }

    fn rejecting(mut self, service: &str) -> Self {
        self.rejecting.insert(service.to_string());
        self
    }

    fn tier(&self, service: &str) -> ResourceTier {
        self.live.lock().unwrap()[service].tier()
    }

    fn set(&self, service: &str, tier: ResourceTier) {
        self.live
            .lock()
            .unwrap()
            .insert(service.to_string(), LiveConfiguration::from_tier(&tier));
    }
}

#[async_trait]
impl DeploymentClient for InMemoryDeployments {
    async fn read(&self, service: &str) -> Result<LiveConfiguration, DeploymentError> {
        self.live
            .lock()
            .unwrap()
            .get(service)
            .copied()
            .ok_or_else(|| DeploymentError::NotFound(service.to_string()))
    }

    async fn apply(
        &self,
        service: &str,
        target: &ResourceTier,
    ) -> Result<ApplyOutcome, DeploymentError> {
        if self.rejecting.contains(service) {
            return Err(DeploymentError::Conflict {
                service: service.to_string(),
            });
        }

        let mut live = self.live.lock().unwrap();
        let entry = live
            .get_mut(service)
            .ok_or_else(|| DeploymentError::NotFound(service.to_string()))?;
        if entry.matches(target) {
            return Ok(ApplyOutcome::Unchanged);
        }
        *entry = LiveConfiguration::from_tier(target);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(ApplyOutcome::Committed)
    }
}

/// A round where each service reports (latency ms, cpu %, error count)
fn round(services: &[(&str, f64, f64, f64)]) -> Round {
    let standard = services
        .iter()
        .map(|(name, latency_ms, cpu, _)| json!([name, latency_ms * 1_000_000.0, cpu, 40.0]))
        .collect();
    let errors = services
        .iter()
        .filter(|(_, _, _, errors)| *errors > 0.0)
        .map(|(name, _, _, errors)| json!([name, errors]))
        .collect();

    let mut round = Round::new();
    round.insert("standard".to_string(), Ok(standard));
    round.insert("status_codes".to_string(), Ok(errors));
    round
}

fn config_for(services: &[&str]) -> ControllerConfig {
    ControllerConfig {
        services: services.iter().map(|s| s.to_string()).collect(),
        pacing: PacingConfig {
            settle_secs: 0,
            poll_interval_secs: 0,
            cooldown_secs: 0,
        },
        ..Default::default()
    }
}

fn control_loop(
    services: &[&str],
    telemetry: Arc<ScriptedTelemetry>,
    deployments: Arc<InMemoryDeployments>,
    health: HealthRegistry,
) -> ControlLoop {
    ControlLoopBuilder::new()
        .config(config_for(services))
        .telemetry(telemetry)
        .deployments(deployments)
        .health(health)
        .build()
        .unwrap()
}

#[test]
fn test_pacing_config_default() {
    let pacing = PacingConfig::default();
    assert_eq!(pacing.settle(), Duration::from_secs(180));
    assert_eq!(pacing.delay(Pacing::Idle), Duration::from_secs(10));
    assert_eq!(pacing.delay(Pacing::Acted), Duration::from_secs(360));
}

#[test]
fn test_builder_requires_collaborators() {
    let missing_telemetry = ControlLoopBuilder::new()
        .deployments(Arc::new(InMemoryDeployments::new(&[])))
        .build();
    assert!(missing_telemetry.is_err());

    let missing_deployments = ControlLoopBuilder::new()
        .telemetry(Arc::new(ScriptedTelemetry::new(vec![])))
        .build();
    assert!(missing_deployments.is_err());
}

#[tokio::test]
async fn test_bootstrap_sets_smallest_tier() {
    let deployments = Arc::new(InMemoryDeployments::new(&[(AUTH, C3), (BOOKING, C1)]));
    let control = control_loop(
        &[AUTH, BOOKING],
        Arc::new(ScriptedTelemetry::new(vec![])),
        deployments.clone(),
        HealthRegistry::new(),
    );

    let failures = control.bootstrap().await;

    assert!(failures.is_empty());
    assert_eq!(deployments.tier(AUTH), C1);
    assert_eq!(deployments.tier(BOOKING), C1);
    assert_eq!(deployments.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_upscale_then_downscale_then_idle() {
    let telemetry = Arc::new(ScriptedTelemetry::new(vec![
        round(&[(AUTH, 6000.0, 40.0, 0.0)]),
        round(&[(AUTH, 200.0, 2.0, 0.0)]),
        round(&[(AUTH, 200.0, 2.0, 0.0)]),
    ]));
    let deployments = Arc::new(InMemoryDeployments::new(&[(AUTH, C1)]));
    let control = control_loop(&[AUTH], telemetry, deployments.clone(), HealthRegistry::new());

    let first = control.run_iteration().await;
    match first.outcome(AUTH) {
        Some(ServiceOutcome::Applied(plan)) => {
            assert_eq!(plan.direction, ScaleDirection::Up);
            assert!((plan.utility - 0.35).abs() < 1e-9);
            assert_eq!(plan.from, C1);
            assert_eq!(plan.to, C2);
        }
        other => panic!("expected upscale, got {:?}", other),
    }
    assert_eq!(first.pacing(), Pacing::Acted);
    assert_eq!(deployments.tier(AUTH), C2);

    let second = control.run_iteration().await;
    match second.outcome(AUTH) {
        Some(ServiceOutcome::Applied(plan)) => {
            assert_eq!(plan.direction, ScaleDirection::Down);
            assert_eq!(plan.to, C1);
        }
        other => panic!("expected downscale, got {:?}", other),
    }
    assert_eq!(deployments.tier(AUTH), C1);

    let third = control.run_iteration().await;
    assert_eq!(
        third.outcome(AUTH),
        Some(&ServiceOutcome::AtBound(ScaleDirection::Down))
    );
    assert!(!third.any_action_taken());
    assert_eq!(third.pacing(), Pacing::Idle);
    assert_eq!(deployments.writes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_healthy_busy_service_is_held() {
    let telemetry = Arc::new(ScriptedTelemetry::new(vec![round(&[(AUTH, 200.0, 60.0, 0.0)])]));
    let deployments = Arc::new(InMemoryDeployments::new(&[(AUTH, C2)]));
    let control = control_loop(&[AUTH], telemetry, deployments.clone(), HealthRegistry::new());

    let report = control.run_iteration().await;

    assert_eq!(
        report.outcome(AUTH),
        Some(&ServiceOutcome::Held(DecisionReason::WithinBand))
    );
    assert_eq!(deployments.tier(AUTH), C2);
}

#[tokio::test]
async fn test_every_unapplied_service_is_logged() {
    let captured = CapturedEvents::start();
    let telemetry = Arc::new(ScriptedTelemetry::new(vec![round(&[
        (AUTH, 200.0, 60.0, 0.0),
        (BOOKING, 200.0, 2.0, 0.0),
    ])]));
    let deployments = Arc::new(InMemoryDeployments::new(&[
        (AUTH, C2),
        (BOOKING, C1),
        (FLIGHT, C1),
    ]));
    let control = control_loop(
        &[AUTH, BOOKING, FLIGHT],
        telemetry,
        deployments,
        HealthRegistry::new(),
    );

    let report = control.run_iteration().await;
    assert!(!report.any_action_taken());

    let holds = captured.named("scale_hold");
    assert_eq!(holds.len(), 3);

    assert_eq!(holds[0]["service"], AUTH);
    assert_eq!(holds[0]["tier"], "250m/500Mix1");
    assert!((holds[0]["utility"].as_f64().unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(holds[0]["cpu_percent"], 60.0);
    assert_eq!(holds[0]["reason"], "within_band");

    assert_eq!(holds[1]["service"], BOOKING);
    assert_eq!(holds[1]["tier"], "250m/250Mix1");
    assert_eq!(holds[1]["reason"], "at_floor");

    assert_eq!(holds[2]["service"], FLIGHT);
    assert_eq!(holds[2]["reason"], "no_telemetry");
    assert!(holds[2].get("utility").is_none());
}

#[tokio::test]
async fn test_largest_tier_overflows_by_doubling_replicas() {
    let telemetry = Arc::new(ScriptedTelemetry::new(vec![round(&[(AUTH, 3500.0, 90.0, 5.0)])]));
    let deployments = Arc::new(InMemoryDeployments::new(&[(AUTH, C3)]));
    let control = control_loop(&[AUTH], telemetry, deployments.clone(), HealthRegistry::new());

    control.run_iteration().await;
    assert_eq!(deployments.tier(AUTH), ResourceTier::new(250, 500, 4));
}

#[tokio::test]
async fn test_unknown_tier_scales_down_by_halving() {
    let telemetry = Arc::new(ScriptedTelemetry::new(vec![round(&[(AUTH, 100.0, 1.0, 0.0)])]));
    let deployments = Arc::new(InMemoryDeployments::new(&[(AUTH, ResourceTier::new(250, 500, 8))]));
    let control = control_loop(&[AUTH], telemetry, deployments.clone(), HealthRegistry::new());

    control.run_iteration().await;
    assert_eq!(deployments.tier(AUTH), ResourceTier::new(250, 500, 4));

    // Drift back onto a catalog tier re-enters the catalog
    deployments.set(AUTH, ResourceTier::new(250, 500, 2));
    control.run_iteration().await;
    assert_eq!(deployments.tier(AUTH), C2);
}

#[tokio::test]
async fn test_fetch_failure_skips_decisions() {
    let mut failing = round(&[(AUTH, 6000.0, 40.0, 0.0)]);
    failing.insert("status_codes".to_string(), Err(503));

    let telemetry = Arc::new(ScriptedTelemetry::new(vec![failing]));
    let deployments = Arc::new(InMemoryDeployments::new(&[(AUTH, C1)]));
    let health = HealthRegistry::new();
    let control = control_loop(&[AUTH], telemetry, deployments.clone(), health.clone());

    let report = control.run_iteration().await;

    assert_eq!(report.outcome(AUTH), Some(&ServiceOutcome::NoTelemetry));
    assert_eq!(report.pacing(), Pacing::Idle);
    assert_eq!(deployments.writes.load(Ordering::SeqCst), 0);

    let status = health.health().await;
    assert_eq!(
        status.components[components::TELEMETRY].status,
        ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn test_services_missing_from_telemetry_are_skipped() {
    let telemetry = Arc::new(ScriptedTelemetry::new(vec![round(&[(AUTH, 6000.0, 40.0, 0.0)])]));
    let deployments = Arc::new(InMemoryDeployments::new(&[(AUTH, C1), (BOOKING, C1)]));
    let control = control_loop(&[AUTH, BOOKING], telemetry, deployments.clone(), HealthRegistry::new());

    let report = control.run_iteration().await;

    assert!(matches!(report.outcome(AUTH), Some(ServiceOutcome::Applied(_))));
    assert_eq!(report.outcome(BOOKING), Some(&ServiceOutcome::NoTelemetry));
    assert_eq!(deployments.tier(BOOKING), C1);
}

#[tokio::test]
async fn test_apply_failure_is_isolated() {
    let telemetry = Arc::new(ScriptedTelemetry::new(vec![round(&[
        (BOOKING, 6000.0, 40.0, 0.0),
        (AUTH, 6000.0, 40.0, 0.0),
    ])]));
    let deployments = Arc::new(
        InMemoryDeployments::new(&[(AUTH, C1), (BOOKING, C1)]).rejecting(BOOKING),
    );
    let health = HealthRegistry::new();
    let control = control_loop(&[BOOKING, AUTH], telemetry, deployments.clone(), health.clone());

    let report = control.run_iteration().await;

    match report.outcome(BOOKING) {
        Some(ServiceOutcome::ApplyFailed { plan, error }) => {
            assert_eq!(plan.to, C2);
            assert!(error.contains(BOOKING));
        }
        other => panic!("expected apply failure, got {:?}", other),
    }
    assert!(matches!(report.outcome(AUTH), Some(ServiceOutcome::Applied(_))));
    assert!(report.any_action_taken());
    assert_eq!(report.deployment_failures(), 1);
    assert_eq!(deployments.tier(AUTH), C2);

    let status = health.health().await;
    assert_eq!(
        status.components[components::DEPLOYMENTS].status,
        ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn test_missing_deployment_reports_read_failure() {
    let captured = CapturedEvents::start();
    let telemetry = Arc::new(ScriptedTelemetry::new(vec![round(&[(AUTH, 6000.0, 40.0, 0.0)])]));
    let deployments = Arc::new(InMemoryDeployments::new(&[]));
    let control = control_loop(&[AUTH], telemetry, deployments, HealthRegistry::new());

    let report = control.run_iteration().await;
    assert!(matches!(
        report.outcome(AUTH),
        Some(ServiceOutcome::ReadFailed(_))
    ));

    let holds = captured.named("scale_hold");
    assert_eq!(holds.len(), 1);
    assert_eq!(holds[0]["reason"], "live_read_failed");
    assert_eq!(holds[0]["utility"], 0.35);
}

#[tokio::test]
async fn test_shutdown_during_settle() {
    let telemetry = Arc::new(ScriptedTelemetry::new(vec![]));
    let deployments = Arc::new(InMemoryDeployments::new(&[(AUTH, C2)]));
    let health = HealthRegistry::new();
    let control = ControlLoopBuilder::new()
        .config(config_for(&[AUTH]))
        .pacing(PacingConfig {
            settle_secs: 3600,
            ..Default::default()
        })
        .telemetry(telemetry.clone())
        .deployments(deployments.clone())
        .health(health.clone())
        .build()
        .unwrap();

    let (tx, rx) = broadcast::channel(1);
    tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), control.run(rx))
        .await
        .unwrap();

    assert_eq!(deployments.tier(AUTH), C1);
    assert_eq!(telemetry.calls.load(Ordering::SeqCst), 0);
    assert!(!health.readiness().await.ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_loop_iterates_until_shutdown() {
    let telemetry = Arc::new(ScriptedTelemetry::new(vec![round(&[(AUTH, 200.0, 50.0, 0.0)])]));
    let deployments = Arc::new(InMemoryDeployments::new(&[(AUTH, C1)]));
    let control = control_loop(&[AUTH], telemetry.clone(), deployments, HealthRegistry::new());

    let (tx, rx) = broadcast::channel(1);
    let handle = tokio::spawn(control.run(rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(telemetry.calls.load(Ordering::SeqCst) >= 2);
}

//! Observability infrastructure for the tier controller
//!
//! Provides:
//! - Prometheus metrics (iteration latency, scale actions, fetch and apply errors, per-service gauges)
//! - Structured JSON logging of controller events with tracing

use crate::models::{ResourceTier, ScaleDirection};
use crate::scaling::ScalePlan;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Iterations wait on two network round trips per group plus the writes
const ITERATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<ControllerMetricsInner> = OnceLock::new();

struct ControllerMetricsInner {
    iterations: IntCounter,
    iteration_duration_seconds: Histogram,
    scale_actions: IntCounterVec,
    apply_errors: IntCounter,
    fetch_errors: IntCounterVec,
    service_utility: GaugeVec,
    service_replicas: IntGaugeVec,
}

impl ControllerMetricsInner {
    fn new() -> Self {
        Self {
            iterations: register_int_counter!(
                "tier_controller_iterations_total",
                "Number of completed control loop iterations"
            )
            .expect("Failed to register iterations_total"),

            iteration_duration_seconds: register_histogram!(
                "tier_controller_iteration_duration_seconds",
                "Time spent fetching, planning and applying in one iteration",
                ITERATION_BUCKETS.to_vec()
            )
            .expect("Failed to register iteration_duration_seconds"),

            scale_actions: register_int_counter_vec!(
                "tier_controller_scale_actions_total",
                "Resource tier changes committed, by direction",
                &["direction"]
            )
            .expect("Failed to register scale_actions_total"),

            apply_errors: register_int_counter!(
                "tier_controller_apply_errors_total",
                "Resource tier changes that failed to commit"
            )
            .expect("Failed to register apply_errors_total"),

            fetch_errors: register_int_counter_vec!(
                "tier_controller_fetch_errors_total",
                "Failed telemetry queries, by metric group",
                &["group"]
            )
            .expect("Failed to register fetch_errors_total"),

            service_utility: register_gauge_vec!(
                "tier_controller_service_utility",
                "Latest utility score per service",
                &["service"]
            )
            .expect("Failed to register service_utility"),

            service_replicas: register_int_gauge_vec!(
                "tier_controller_service_replicas",
                "Replica count of the tier last observed or applied per service",
                &["service"]
            )
            .expect("Failed to register service_replicas"),
        }
    }
}

/// Handle to the controller's Prometheus metrics
///
/// Clones share the globally registered metrics.
#[derive(Clone)]
pub struct ControllerMetrics {
    _private: (),
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ControllerMetricsInner {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new)
    }

    pub fn observe_iteration(&self, duration_secs: f64) {
        self.inner().iterations.inc();
        self.inner().iteration_duration_seconds.observe(duration_secs);
    }

    pub fn inc_scale_action(&self, direction: ScaleDirection) {
        self.inner()
            .scale_actions
            .with_label_values(&[direction.as_str()])
            .inc();
    }

    pub fn inc_apply_errors(&self) {
        self.inner().apply_errors.inc();
    }

    pub fn inc_fetch_errors(&self, group: &str) {
        self.inner().fetch_errors.with_label_values(&[group]).inc();
    }

    pub fn set_service_utility(&self, service: &str, utility: f64) {
        self.inner()
            .service_utility
            .with_label_values(&[service])
            .set(utility);
    }

    pub fn set_service_replicas(&self, service: &str, replicas: u32) {
        self.inner()
            .service_replicas
            .with_label_values(&[service])
            .set(i64::from(replicas));
    }
}

/// Structured logger for controller events
#[derive(Clone)]
pub struct StructuredLogger {
    namespace: String,
}

impl StructuredLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn log_startup(&self, version: &str, services: usize, tiers: usize) {
        info!(
            event = "controller_started",
            namespace = %self.namespace,
            controller_version = %version,
            services = services,
            tiers = tiers,
            "Tier controller started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "controller_shutdown",
            namespace = %self.namespace,
            reason = %reason,
            "Tier controller shutting down"
        );
    }

    pub fn log_bootstrap(&self, tier: &ResourceTier, applied: usize, failed: usize) {
        info!(
            event = "services_bootstrapped",
            namespace = %self.namespace,
            tier = %tier,
            applied = applied,
            failed = failed,
            "Services set to the smallest tier"
        );
    }

    pub fn log_decision(&self, plan: &ScalePlan) {
        info!(
            event = "scale_decision",
            namespace = %self.namespace,
            service = %plan.service,
            direction = %plan.direction,
            from_tier = %plan.from,
            to_tier = %plan.to,
            utility = plan.utility,
            cpu_percent = plan.cpu_percent,
            reason = %plan.reason,
            "Scaling decision made"
        );
    }

    /// A service left at its current tier this iteration
    ///
    /// `tier`, `utility` and `cpu_percent` are absent when the service
    /// could not be scored.
    pub fn log_hold(
        &self,
        service: &str,
        tier: Option<&ResourceTier>,
        utility: Option<f64>,
        cpu_percent: Option<f64>,
        reason: &str,
    ) {
        info!(
            event = "scale_hold",
            namespace = %self.namespace,
            service = %service,
            tier = tier.map(tracing::field::display),
            utility = utility,
            cpu_percent = cpu_percent,
            reason = %reason,
            "Service held at current tier"
        );
    }

    pub fn log_applied(&self, plan: &ScalePlan) {
        info!(
            event = "scale_applied",
            namespace = %self.namespace,
            service = %plan.service,
            direction = %plan.direction,
            to_tier = %plan.to,
            "Resource tier applied"
        );
    }

    pub fn log_apply_failed(&self, plan: &ScalePlan, error: &str) {
        warn!(
            event = "scale_apply_failed",
            namespace = %self.namespace,
            service = %plan.service,
            direction = %plan.direction,
            to_tier = %plan.to,
            error = %error,
            "Failed to apply resource tier"
        );
    }

    pub fn log_fetch_failed(&self, group: &str, error: &str) {
        warn!(
            event = "telemetry_fetch_failed",
            namespace = %self.namespace,
            group = %group,
            error = %error,
            "Telemetry query failed, affected services skipped this iteration"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::capture::capture_events;
    use super::*;
    use crate::scaling::DecisionReason;

    #[test]
    fn test_controller_metrics_record() {
        let metrics = ControllerMetrics::new();
        let again = ControllerMetrics::new();

        metrics.observe_iteration(0.2);
        metrics.inc_scale_action(ScaleDirection::Up);
        metrics.inc_apply_errors();
        again.inc_fetch_errors("standard");
        again.set_service_utility("acmeair-authservice", 0.5);
        again.set_service_replicas("acmeair-authservice", 2);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "tier_controller_scale_actions_total"));
        assert!(families
            .iter()
            .any(|f| f.get_name() == "tier_controller_service_utility"));
    }

    fn plan() -> ScalePlan {
        ScalePlan {
            service: "acmeair-authservice".to_string(),
            direction: ScaleDirection::Up,
            from: ResourceTier::new(250, 250, 1),
            to: ResourceTier::new(250, 500, 1),
            utility: 0.35,
            cpu_percent: 40.0,
            reason: DecisionReason::Degraded,
        }
    }

    #[test]
    fn test_structured_logger_events() {
        let logger = StructuredLogger::new("acmeair-g2");
        let plan = plan();

        let events = capture_events(|| {
            logger.log_decision(&plan);
            logger.log_applied(&plan);
            logger.log_apply_failed(&plan, "conflict");
            logger.log_fetch_failed("status_codes", "timeout");
        });

        assert_eq!(events.len(), 4);
        for event in &events {
            assert_eq!(event["fields"]["namespace"], "acmeair-g2");
        }

        let decision = &events[0]["fields"];
        assert_eq!(decision["event"], "scale_decision");
        assert_eq!(decision["service"], "acmeair-authservice");
        assert_eq!(decision["from_tier"], "250m/250Mix1");
        assert_eq!(decision["to_tier"], "250m/500Mix1");
        assert_eq!(decision["direction"], "up");
        assert_eq!(decision["utility"], 0.35);
        assert_eq!(decision["reason"], "degraded");

        assert_eq!(events[1]["fields"]["event"], "scale_applied");
        assert_eq!(events[2]["fields"]["event"], "scale_apply_failed");
        assert_eq!(events[2]["level"], "WARN");
        assert_eq!(events[2]["fields"]["error"], "conflict");
        assert_eq!(events[3]["fields"]["event"], "telemetry_fetch_failed");
        assert_eq!(events[3]["fields"]["group"], "status_codes");
    }

    #[test]
    fn test_hold_event_records_utility_and_reason() {
        let logger = StructuredLogger::new("acmeair-g2");
        let tier = ResourceTier::new(250, 250, 1);

        let events = capture_events(|| {
            logger.log_hold(
                "acmeair-flightservice",
                Some(&tier),
                Some(0.825),
                Some(62.5),
                DecisionReason::WithinBand.as_str(),
            );
            logger.log_hold("acmeair-mainservice", None, None, None, "no_telemetry");
        });

        assert_eq!(events.len(), 2);
        let held = &events[0]["fields"];
        assert_eq!(held["event"], "scale_hold");
        assert_eq!(held["service"], "acmeair-flightservice");
        assert_eq!(held["tier"], "250m/250Mix1");
        assert_eq!(held["utility"], 0.825);
        assert_eq!(held["cpu_percent"], 62.5);
        assert_eq!(held["reason"], "within_band");

        let unscored = &events[1]["fields"];
        assert_eq!(unscored["event"], "scale_hold");
        assert_eq!(unscored["reason"], "no_telemetry");
        assert!(unscored.get("utility").is_none());
        assert!(unscored.get("tier").is_none());
    }
}

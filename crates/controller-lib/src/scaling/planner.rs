//! Scale planning
//!
//! Turns a service's utility and CPU usage into a tier transition. Any
//! degradation scales up; scaling down requires maximum utility with
//! near-idle CPU.

use super::catalog::TierCatalog;
use super::utility::is_max_utility;
use crate::models::{ResourceTier, ScaleDirection, ServiceObservation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Utility below which a service is scaled up
pub const UPSCALE_UTILITY_THRESHOLD: f64 = 0.7;

/// CPU percentage below which a fully healthy service is scaled down
pub const DOWNSCALE_CPU_THRESHOLD_PERCENT: f64 = 5.0;

/// Policy thresholds for the planner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalePolicy {
    pub upscale_below_utility: f64,
    pub downscale_below_cpu_percent: f64,
}

impl Default for ScalePolicy {
    fn default() -> Self {
        Self {
            upscale_below_utility: UPSCALE_UTILITY_THRESHOLD,
            downscale_below_cpu_percent: DOWNSCALE_CPU_THRESHOLD_PERCENT,
        }
    }
}

/// What the policy wants for a service, before consulting the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Scale(ScaleDirection, DecisionReason),
    Hold(DecisionReason),
}

/// Why the policy decided what it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Maximum utility while CPU is nearly idle
    OverProvisioned,
    /// Latency or error rate has left the healthy band
    Degraded,
    /// Healthy enough, or busy enough, to leave alone
    WithinBand,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::OverProvisioned => "over_provisioned",
            DecisionReason::Degraded => "degraded",
            DecisionReason::WithinBand => "within_band",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transition the executor should apply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalePlan {
    pub service: String,
    pub direction: ScaleDirection,
    pub from: ResourceTier,
    pub to: ResourceTier,
    pub utility: f64,
    pub cpu_percent: f64,
    pub reason: DecisionReason,
}

/// Outcome of planning a single service
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// A transition should be applied
    Apply(ScalePlan),
    /// The policy asked for nothing
    Hold(DecisionReason),
    /// The policy asked for a transition the catalog cannot make
    AtBound(ScaleDirection),
}

/// Decides hold / up one tier / down one tier per service
#[derive(Debug, Clone, Default)]
pub struct ScalePlanner {
    policy: ScalePolicy,
}

impl ScalePlanner {
    pub fn new(policy: ScalePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScalePolicy {
        &self.policy
    }

    /// Apply the policy; first matching rule wins
    pub fn decide(&self, utility: f64, cpu_percent: f64) -> Decision {
        if is_max_utility(utility) && cpu_percent < self.policy.downscale_below_cpu_percent {
            Decision::Scale(ScaleDirection::Down, DecisionReason::OverProvisioned)
        } else if utility < self.policy.upscale_below_utility {
            Decision::Scale(ScaleDirection::Up, DecisionReason::Degraded)
        } else {
            Decision::Hold(DecisionReason::WithinBand)
        }
    }

    /// Plan a service against the catalog, starting from its live tier
    pub fn plan(&self, observation: &ServiceObservation, catalog: &TierCatalog) -> PlanOutcome {
        let (direction, reason) =
            match self.decide(observation.utility, observation.means.cpu_percent) {
                Decision::Hold(reason) => return PlanOutcome::Hold(reason),
                Decision::Scale(direction, reason) => (direction, reason),
            };

        let current = observation.live.tier();
        match catalog.next(&current, direction) {
            Some(target) => PlanOutcome::Apply(ScalePlan {
                service: observation.service.clone(),
                direction,
                from: current,
                to: target,
                utility: observation.utility,
                cpu_percent: observation.means.cpu_percent,
                reason,
            }),
            None => PlanOutcome::AtBound(direction),
        }
    }
}

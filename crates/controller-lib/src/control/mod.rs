//! The closed control loop
//!
//! Each iteration fetches one telemetry window, scores every configured
//! service, plans a single-tier transition where the policy asks for one
//! and applies it. Whether anything was applied selects the delay before
//! the next iteration.

mod r#loop;

#[cfg(test)]
mod tests;

pub use r#loop::{ControlLoop, ControlLoopBuilder};

use crate::models::ScaleDirection;
use crate::scaling::{DecisionReason, ScalePlan};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delays between control loop phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Wait after bootstrap before the first decision (default: 180)
    pub settle_secs: u64,
    /// Wait after an iteration that applied nothing (default: 10)
    pub poll_interval_secs: u64,
    /// Wait after an iteration that applied a change (default: 360)
    pub cooldown_secs: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            settle_secs: 180,
            poll_interval_secs: 10,
            cooldown_secs: 360,
        }
    }
}

impl PacingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    /// Delay before the iteration following one in state `pacing`
    pub fn delay(&self, pacing: Pacing) -> Duration {
        match pacing {
            Pacing::Idle => Duration::from_secs(self.poll_interval_secs),
            Pacing::Acted => Duration::from_secs(self.cooldown_secs),
        }
    }
}

/// Pacing state after an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Nothing was applied
    Idle,
    /// At least one service changed tier
    Acted,
}

/// What happened to one service in one iteration
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceOutcome {
    /// A new tier was committed
    Applied(ScalePlan),
    /// The planned tier was already live when applied
    Unchanged(ScalePlan),
    /// The policy asked for nothing
    Held(DecisionReason),
    /// The policy asked for a transition past the catalog's bounds
    AtBound(ScaleDirection),
    /// The service had no usable telemetry this iteration
    NoTelemetry,
    /// The live configuration could not be read
    ReadFailed(String),
    /// The platform rejected the planned tier
    ApplyFailed { plan: ScalePlan, error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceReport {
    pub service: String,
    pub outcome: ServiceOutcome,
}

/// Per-service outcomes of an iteration, in evaluation order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationReport {
    pub services: Vec<ServiceReport>,
}

impl IterationReport {
    pub fn push(&mut self, service: &str, outcome: ServiceOutcome) {
        self.services.push(ServiceReport {
            service: service.to_string(),
            outcome,
        });
    }

    pub fn outcome(&self, service: &str) -> Option<&ServiceOutcome> {
        self.services
            .iter()
            .find(|report| report.service == service)
            .map(|report| &report.outcome)
    }

    /// Plans committed this iteration
    pub fn applied(&self) -> impl Iterator<Item = &ScalePlan> {
        self.services.iter().filter_map(|report| match &report.outcome {
            ServiceOutcome::Applied(plan) => Some(plan),
            _ => None,
        })
    }

    pub fn any_action_taken(&self) -> bool {
        self.applied().next().is_some()
    }

    pub fn pacing(&self) -> Pacing {
        if self.any_action_taken() {
            Pacing::Acted
        } else {
            Pacing::Idle
        }
    }

    /// Services whose live state could not be read or written
    pub fn deployment_failures(&self) -> usize {
        self.services
            .iter()
            .filter(|report| {
                matches!(
                    report.outcome,
                    ServiceOutcome::ReadFailed(_) | ServiceOutcome::ApplyFailed { .. }
                )
            })
            .count()
    }
}

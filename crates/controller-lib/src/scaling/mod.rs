//! Scaling decisions
//!
//! Scores services from their telemetry means, keeps the ordered tier
//! catalog, and plans one-step transitions through it.

mod catalog;
mod planner;
mod utility;

pub use catalog::{
    default_tier_specs, NamedTier, TierCatalog, TierPosition, TierSpec, MAX_REPLICAS,
};
pub use planner::{
    Decision, DecisionReason, PlanOutcome, ScalePlan, ScalePlanner, ScalePolicy,
    DOWNSCALE_CPU_THRESHOLD_PERCENT, UPSCALE_UTILITY_THRESHOLD,
};
pub use utility::{
    error_preference, is_max_utility, latency_preference, UtilityScorer, UtilityWeights,
    ERROR_RATE_WEIGHT, LATENCY_WEIGHT, MAX_UTILITY, UTILITY_EPSILON,
};

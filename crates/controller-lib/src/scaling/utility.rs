//! Utility scoring
//!
//! Maps per-service latency and error-count means through piecewise
//! preference functions and combines them into a single weighted score.
//! The preferences take a handful of discrete values, so the achievable
//! utilities form a small fixed lattice rather than a continuum.

use crate::error::ConfigError;
use crate::models::ServiceMeans;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default weight of the latency preference
pub const LATENCY_WEIGHT: f64 = 0.65;

/// Default weight of the error-rate preference
pub const ERROR_RATE_WEIGHT: f64 = 0.35;

/// Highest achievable utility
pub const MAX_UTILITY: f64 = 1.0;

/// Tolerance for comparing utilities produced by float arithmetic
pub const UTILITY_EPSILON: f64 = 1e-9;

/// Latency bands in milliseconds: (upper bound exclusive, preference)
const LATENCY_BANDS: &[(f64, f64)] = &[(1000.0, 1.0), (3000.0, 0.5), (5000.0, 0.2)];

/// Error-count bands: (upper bound exclusive, preference)
const ERROR_BANDS: &[(f64, f64)] = &[(1.0, 1.0), (3.0, 0.5)];

/// Weights of the two preferences; must sum to one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilityWeights {
    pub latency: f64,
    pub error_rate: f64,
}

impl Default for UtilityWeights {
    fn default() -> Self {
        Self {
            latency: LATENCY_WEIGHT,
            error_rate: ERROR_RATE_WEIGHT,
        }
    }
}

impl UtilityWeights {
    /// Check the weights form a convex combination
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.latency + self.error_rate;
        if self.latency < 0.0 || self.error_rate < 0.0 || (sum - 1.0).abs() > UTILITY_EPSILON {
            return Err(ConfigError::WeightSum(sum));
        }
        Ok(())
    }
}

/// Preference for a mean latency in milliseconds
///
/// Lower band bounds are inclusive, upper bounds exclusive; anything at or
/// above 5000ms has no value.
pub fn latency_preference(latency_ms: f64) -> f64 {
    band_preference(LATENCY_BANDS, latency_ms)
}

/// Preference for a mean error count
pub fn error_preference(error_count: f64) -> f64 {
    band_preference(ERROR_BANDS, error_count)
}

fn band_preference(bands: &[(f64, f64)], value: f64) -> f64 {
    bands
        .iter()
        .find(|(upper, _)| value < *upper)
        .map(|(_, preference)| *preference)
        .unwrap_or(0.0)
}

/// Reduces service means to utility scores
#[derive(Debug, Clone, Default)]
pub struct UtilityScorer {
    weights: UtilityWeights,
}

impl UtilityScorer {
    pub fn new(weights: UtilityWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &UtilityWeights {
        &self.weights
    }

    /// Utility of a single service
    pub fn utility(&self, means: &ServiceMeans) -> f64 {
        self.weights.latency * latency_preference(means.latency_ms)
            + self.weights.error_rate * error_preference(means.error_count)
    }

    /// Utility of every service in `means_by_service`
    pub fn score(&self, means_by_service: &HashMap<String, ServiceMeans>) -> HashMap<String, f64> {
        means_by_service
            .iter()
            .map(|(service, means)| (service.clone(), self.utility(means)))
            .collect()
    }
}

/// True if `utility` is the ceiling of the lattice
pub fn is_max_utility(utility: f64) -> bool {
    utility >= MAX_UTILITY - UTILITY_EPSILON
}

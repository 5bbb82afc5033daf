//! Core data models for the tier controller

use crate::quantity::{format_cpu_millis, format_memory_mib};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metrics the controller reads from the telemetry backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Mean HTTP request time (backend reports nanoseconds)
    Latency,
    /// HTTP requests answered with an error status code
    ErrorCount,
    /// Container CPU used, percent of limit
    CpuUsed,
    /// Container memory used, percent of limit
    MemoryUsed,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Latency => "latency",
            MetricKind::ErrorCount => "error_count",
            MetricKind::CpuUsed => "cpu_used",
            MetricKind::MemoryUsed => "memory_used",
        }
    }
}

/// One observation of a metric for a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub service: String,
    pub metric: MetricKind,
    pub timestamp: i64,
    pub value: f64,
}

/// Per-service means over the trailing telemetry window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceMeans {
    pub latency_ms: f64,
    pub error_count: f64,
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

/// A point in the resource space: CPU, memory and replica count
///
/// Equality is structural, so `250m` and `0.25` CPU resolve to the same tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceTier {
    pub cpu_millis: u32,
    pub memory_mib: u32,
    pub replicas: u32,
}

impl ResourceTier {
    pub const fn new(cpu_millis: u32, memory_mib: u32, replicas: u32) -> Self {
        Self {
            cpu_millis,
            memory_mib,
            replicas,
        }
    }

    /// True if `self` holds at least as much of every resource as `other`
    /// and strictly more of at least one.
    pub fn dominates(&self, other: &ResourceTier) -> bool {
        let at_least = self.cpu_millis >= other.cpu_millis
            && self.memory_mib >= other.memory_mib
            && self.replicas >= other.replicas;
        at_least && self != other
    }

    pub fn cpu_quantity(&self) -> String {
        format_cpu_millis(self.cpu_millis)
    }

    pub fn memory_quantity(&self) -> String {
        format_memory_mib(self.memory_mib)
    }
}

impl fmt::Display for ResourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}x{}",
            self.cpu_quantity(),
            self.memory_quantity(),
            self.replicas
        )
    }
}

/// Resources currently applied to a service's Deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveConfiguration {
    pub cpu_request_millis: u32,
    pub cpu_limit_millis: u32,
    pub memory_request_mib: u32,
    pub memory_limit_mib: u32,
    pub replicas: u32,
}

impl LiveConfiguration {
    /// Guaranteed-QoS configuration for a tier (requests equal limits)
    pub fn from_tier(tier: &ResourceTier) -> Self {
        Self {
            cpu_request_millis: tier.cpu_millis,
            cpu_limit_millis: tier.cpu_millis,
            memory_request_mib: tier.memory_mib,
            memory_limit_mib: tier.memory_mib,
            replicas: tier.replicas,
        }
    }

    /// The tier this configuration occupies, keyed on its limits
    pub fn tier(&self) -> ResourceTier {
        ResourceTier::new(self.cpu_limit_millis, self.memory_limit_mib, self.replicas)
    }

    /// True if requests, limits and replicas all match `tier`
    pub fn matches(&self, tier: &ResourceTier) -> bool {
        *self == Self::from_tier(tier)
    }
}

/// Direction of a tier transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleDirection {
    Up,
    Down,
}

impl ScaleDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleDirection::Up => "up",
            ScaleDirection::Down => "down",
        }
    }
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the planner knows about one service in one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceObservation {
    pub service: String,
    pub means: ServiceMeans,
    pub utility: f64,
    pub live: LiveConfiguration,
}

//! Controller library for tier-based service autoscaling
//!
//! This crate provides the core functionality for:
//! - Telemetry retrieval and per-service aggregation
//! - Utility scoring of latency and error-rate health
//! - The resource tier catalog and scale planning
//! - Applying resource tiers to live Deployments
//! - The paced control loop, health checks and observability

pub mod config;
pub mod control;
pub mod error;
pub mod executor;
pub mod health;
pub mod models;
pub mod observability;
pub mod quantity;
pub mod scaling;
pub mod telemetry;

pub use config::ControllerConfig;
pub use error::{ApplyError, ConfigError, DeploymentError, FetchError, QuantityError, ValidationError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ControllerMetrics, StructuredLogger};

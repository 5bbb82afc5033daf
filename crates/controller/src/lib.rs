//! Tier Controller - closed-loop resource tier autoscaler
//!
//! Runs the control loop against the configured namespace and serves
//! health and Prometheus endpoints alongside it.

pub mod api;
pub mod settings;

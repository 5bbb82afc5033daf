//! Error types for the tier controller
//!
//! Every failure is local to the service or metric group it affects; the
//! control loop logs these and moves on.

use crate::models::ResourceTier;
use thiserror::Error;

/// A telemetry query rejected before it reaches the backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("window start offset {start_offset_secs}s over sampling {sampling_secs}s exceeds {max_samples} samples")]
    WindowTooLarge {
        start_offset_secs: i64,
        sampling_secs: u64,
        max_samples: u64,
    },

    #[error("sampling interval must be greater than zero")]
    ZeroSampling,

    #[error("window start offset {0}s must be negative")]
    NonNegativeStartOffset(i64),

    #[error("window end offset {end_offset_secs}s precedes start offset {start_offset_secs}s")]
    InvertedWindow {
        start_offset_secs: i64,
        end_offset_secs: i64,
    },
}

/// Failure retrieving telemetry from the backend
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid query: {0}")]
    Validation(#[from] ValidationError),

    #[error("telemetry backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("telemetry request failed: {0}")]
    Transport(String),

    #[error("malformed telemetry response: {0}")]
    Decode(String),
}

/// Failure talking to the deployment platform
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("deployment {0} not found")]
    NotFound(String),

    #[error("deployment {service} has no container resources to manage")]
    MissingResources { service: String },

    #[error("deployment {service} was modified concurrently")]
    Conflict { service: String },

    #[error("invalid quantity on deployment {service}: {source}")]
    Quantity {
        service: String,
        #[source]
        source: QuantityError,
    },

    #[error("deployment {service} cannot carry {replicas} replicas")]
    ReplicasOutOfRange { service: String, replicas: u32 },

    #[error("deployment platform rejected request: {0}")]
    Platform(String),
}

/// A target tier the platform refused to commit
#[derive(Debug, Error)]
#[error("failed to apply {target} to service {service}: {source}")]
pub struct ApplyError {
    pub service: String,
    pub target: ResourceTier,
    #[source]
    pub source: DeploymentError,
}

/// An unparseable Kubernetes resource quantity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("malformed quantity {0:?}")]
    Malformed(String),

    #[error("unknown quantity suffix in {0:?}")]
    UnknownSuffix(String),

    #[error("quantity {0:?} out of range")]
    OutOfRange(String),
}

/// Controller configuration that cannot be used as-is
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("no services configured")]
    NoServices,

    #[error("tier catalog is empty")]
    EmptyCatalog,

    #[error("tier {upper} does not strictly dominate tier {lower}")]
    UnorderedCatalog { lower: String, upper: String },

    #[error("invalid tier quantity: {0}")]
    Quantity(#[from] QuantityError),

    #[error("tier {0} has zero replicas")]
    ZeroReplicas(String),

    #[error("utility weights must sum to 1, got {0}")]
    WeightSum(f64),

    #[error("invalid telemetry window: {0}")]
    Window(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_error_names_service_and_target() {
        let err = ApplyError {
            service: "acmeair-bookingservice".to_string(),
            target: ResourceTier::new(250, 500, 2),
            source: DeploymentError::Conflict {
                service: "acmeair-bookingservice".to_string(),
            },
        };
        let message = err.to_string();
        assert!(message.contains("acmeair-bookingservice"));
        assert!(message.contains("250m/500Mix2"));
    }

    #[test]
    fn test_validation_error_converts_to_fetch_error() {
        let err: FetchError = ValidationError::ZeroSampling.into();
        assert!(matches!(err, FetchError::Validation(ValidationError::ZeroSampling)));
    }
}

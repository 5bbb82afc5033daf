//! Applying resource tiers to live deployments
//!
//! The executor reads and writes a service's Deployment through the
//! [`DeploymentClient`] trait; the Kubernetes-backed implementation lives
//! in [`KubeDeployments`]. Writes set CPU and memory requests equal to
//! limits (guaranteed QoS) together with the replica count.

mod deployments;

pub use self::deployments::{apply_tier, live_configuration, KubeDeployments};

use crate::error::{ApplyError, DeploymentError};
use crate::models::{LiveConfiguration, ResourceTier};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The deployment was changed and the change committed
    Committed,
    /// The deployment already carried the target; nothing was written
    Unchanged,
}

/// Access to the deployment platform
#[async_trait]
pub trait DeploymentClient: Send + Sync {
    /// Read the resources currently applied to a service
    async fn read(&self, service: &str) -> Result<LiveConfiguration, DeploymentError>;

    /// Set a service to `target` and commit
    ///
    /// Implementations must be idempotent: applying a target the live
    /// object already carries succeeds without writing.
    async fn apply(
        &self,
        service: &str,
        target: &ResourceTier,
    ) -> Result<ApplyOutcome, DeploymentError>;
}

/// Applies resolved target tiers to services
#[derive(Clone)]
pub struct ScaleExecutor {
    client: Arc<dyn DeploymentClient>,
}

impl ScaleExecutor {
    pub fn new(client: Arc<dyn DeploymentClient>) -> Self {
        Self { client }
    }

    /// Read a service's live configuration
    pub async fn live(&self, service: &str) -> Result<LiveConfiguration, DeploymentError> {
        self.client.read(service).await
    }

    /// Apply `target` to `service`
    pub async fn apply(
        &self,
        service: &str,
        target: &ResourceTier,
    ) -> Result<ApplyOutcome, ApplyError> {
        match self.client.apply(service, target).await {
            Ok(ApplyOutcome::Committed) => {
                info!(service = %service, target = %target, "Applied resource tier");
                Ok(ApplyOutcome::Committed)
            }
            Ok(ApplyOutcome::Unchanged) => {
                debug!(service = %service, target = %target, "Resource tier already applied");
                Ok(ApplyOutcome::Unchanged)
            }
            Err(source) => {
                warn!(service = %service, target = %target, error = %source, "Failed to apply resource tier");
                Err(ApplyError {
                    service: service.to_string(),
                    target: *target,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory deployments keyed by service
    struct MockDeployments {
        live: Mutex<HashMap<String, LiveConfiguration>>,
        writes: AtomicUsize,
        reject: bool,
    }

    impl MockDeployments {
        fn with(service: &str, tier: ResourceTier) -> Self {
            let mut live = HashMap::new();
            live.insert(service.to_string(), LiveConfiguration::from_tier(&tier));
            Self {
                live: Mutex::new(live),
                writes: AtomicUsize::new(0),
                reject: false,
            }
        }
    }

    #[async_trait]
    impl DeploymentClient for MockDeployments {
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
            if self.reject {
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

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let client = Arc::new(MockDeployments::with("auth", ResourceTier::new(250, 250, 1)));
        let executor = ScaleExecutor::new(client.clone());
        let target = ResourceTier::new(250, 500, 1);

        let first = tokio_test::assert_ok!(executor.apply("auth", &target).await);
        let second = tokio_test::assert_ok!(executor.apply("auth", &target).await);

        assert_eq!(first, ApplyOutcome::Committed);
        assert_eq!(second, ApplyOutcome::Unchanged);
        assert_eq!(client.writes.load(Ordering::SeqCst), 1);
        assert_eq!(executor.live("auth").await.unwrap().tier(), target);
    }

    #[tokio::test]
    async fn test_apply_error_names_service_and_target() {
        let mut client = MockDeployments::with("auth", ResourceTier::new(250, 250, 1));
        client.reject = true;
        let executor = ScaleExecutor::new(Arc::new(client));
        let target = ResourceTier::new(250, 500, 1);

        let err = tokio_test::assert_err!(executor.apply("auth", &target).await);
        assert_eq!(err.service, "auth");
        assert_eq!(err.target, target);
        assert!(matches!(err.source, DeploymentError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_apply_unknown_service() {
        let client = Arc::new(MockDeployments::with("auth", ResourceTier::new(250, 250, 1)));
        let executor = ScaleExecutor::new(client);

        let err = executor
            .apply("ghost", &ResourceTier::new(250, 250, 1))
            .await
            .unwrap_err();
        assert!(matches!(err.source, DeploymentError::NotFound(_)));
    }
}

//! Kubernetes-backed deployment client
//!
//! Reads and writes `apps/v1` Deployments named after each service. The
//! first container's resources are the ones under management. Writes are
//! read-modify-write through `replace`, so a concurrent change made since
//! the read is rejected by the API server as a conflict.

use super::{ApplyOutcome, DeploymentClient};
use crate::error::DeploymentError;
use crate::models::{LiveConfiguration, ResourceTier};
use crate::quantity::{parse_cpu_millis, parse_memory_mib};
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::debug;

const CPU: &str = "cpu";
const MEMORY: &str = "memory";

/// Deployments in one namespace
pub struct KubeDeployments {
    api: Api<Deployment>,
    namespace: String,
}

impl KubeDeployments {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }

    /// Connect using the in-cluster or kubeconfig defaults
    pub async fn try_default(namespace: &str) -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;
        Ok(Self::new(client, namespace))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self, service: &str) -> Result<Deployment, DeploymentError> {
        self.api
            .get(service)
            .await
            .map_err(|e| platform_error(service, e))
    }
}

#[async_trait]
impl DeploymentClient for KubeDeployments {
    async fn read(&self, service: &str) -> Result<LiveConfiguration, DeploymentError> {
        let deployment = self.get(service).await?;
        live_configuration(service, &deployment)
    }

    async fn apply(
        &self,
        service: &str,
        target: &ResourceTier,
    ) -> Result<ApplyOutcome, DeploymentError> {
        let mut deployment = self.get(service).await?;

        if live_configuration(service, &deployment)?.matches(target) {
            return Ok(ApplyOutcome::Unchanged);
        }

        apply_tier(service, &mut deployment, target)?;

        debug!(
            service = %service,
            namespace = %self.namespace,
            resource_version = ?deployment.metadata.resource_version,
            "Replacing deployment"
        );

        self.api
            .replace(service, &PostParams::default(), &deployment)
            .await
            .map_err(|e| platform_error(service, e))?;

        Ok(ApplyOutcome::Committed)
    }
}

fn platform_error(service: &str, error: kube::Error) -> DeploymentError {
    match error {
        kube::Error::Api(response) if response.code == 404 => {
            DeploymentError::NotFound(service.to_string())
        }
        kube::Error::Api(response) if response.code == 409 => DeploymentError::Conflict {
            service: service.to_string(),
        },
        other => DeploymentError::Platform(other.to_string()),
    }
}

/// Extract the managed resources from a Deployment
///
/// Missing limits read as zero, which no catalog tier matches; missing
/// requests fall back to the limits, as the API server defaults them.
pub fn live_configuration(
    service: &str,
    deployment: &Deployment,
) -> Result<LiveConfiguration, DeploymentError> {
    let spec = deployment
        .spec
        .as_ref()
        .ok_or_else(|| DeploymentError::MissingResources {
            service: service.to_string(),
        })?;

    let container = spec
        .template
        .spec
        .as_ref()
        .and_then(|pod| pod.containers.first())
        .ok_or_else(|| DeploymentError::MissingResources {
            service: service.to_string(),
        })?;

    let resources = container.resources.clone().unwrap_or_default();
    let limits = resources.limits.unwrap_or_default();
    let requests = resources.requests.unwrap_or_default();

    let cpu_limit_millis = read_quantity(service, &limits, CPU, parse_cpu_millis)?.unwrap_or(0);
    let memory_limit_mib = read_quantity(service, &limits, MEMORY, parse_memory_mib)?.unwrap_or(0);

    Ok(LiveConfiguration {
        cpu_request_millis: read_quantity(service, &requests, CPU, parse_cpu_millis)?
            .unwrap_or(cpu_limit_millis),
        cpu_limit_millis,
        memory_request_mib: read_quantity(service, &requests, MEMORY, parse_memory_mib)?
            .unwrap_or(memory_limit_mib),
        memory_limit_mib,
        replicas: spec.replicas.unwrap_or(1).max(0) as u32,
    })
}

fn read_quantity(
    service: &str,
    map: &BTreeMap<String, Quantity>,
    key: &str,
    parse: fn(&str) -> Result<u32, crate::error::QuantityError>,
) -> Result<Option<u32>, DeploymentError> {
    map.get(key)
        .map(|quantity| {
            parse(&quantity.0).map_err(|source| DeploymentError::Quantity {
                service: service.to_string(),
                source,
            })
        })
        .transpose()
}

/// Write `target` into a Deployment: requests equal limits, plus replicas
pub fn apply_tier(
    service: &str,
    deployment: &mut Deployment,
    target: &ResourceTier,
) -> Result<(), DeploymentError> {
    let missing = || DeploymentError::MissingResources {
        service: service.to_string(),
    };

    let replicas =
        i32::try_from(target.replicas).map_err(|_| DeploymentError::ReplicasOutOfRange {
            service: service.to_string(),
            replicas: target.replicas,
        })?;

    let spec = deployment.spec.as_mut().ok_or_else(missing)?;
    spec.replicas = Some(replicas);

    let container = spec
        .template
        .spec
        .as_mut()
        .and_then(|pod| pod.containers.first_mut())
        .ok_or_else(missing)?;

    let resources = container
        .resources
        .get_or_insert_with(ResourceRequirements::default);

    let quantities = || {
        BTreeMap::from([
            (CPU.to_string(), Quantity(target.cpu_quantity())),
            (MEMORY.to_string(), Quantity(target.memory_quantity())),
        ])
    };

    resources
        .requests
        .get_or_insert_with(BTreeMap::new)
        .extend(quantities());
    resources
        .limits
        .get_or_insert_with(BTreeMap::new)
        .extend(quantities());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};

    fn deployment(limits: &[(&str, &str)], requests: &[(&str, &str)], replicas: i32) -> Deployment {
        let to_map = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
                .collect::<BTreeMap<_, _>>()
        };

        Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "app".to_string(),
                            resources: Some(ResourceRequirements {
                                limits: Some(to_map(limits)),
                                requests: Some(to_map(requests)),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_live_configuration_parses_quantities() {
        let d = deployment(
            &[("cpu", "0.25"), ("memory", "500Mi")],
            &[("cpu", "250m"), ("memory", "524288000")],
            2,
        );
        let live = live_configuration("auth", &d).unwrap();
        assert_eq!(live.tier(), ResourceTier::new(250, 500, 2));
        assert!(live.matches(&ResourceTier::new(250, 500, 2)));
    }

    #[test]
    fn test_live_configuration_defaults_requests_to_limits() {
        let d = deployment(&[("cpu", "250m"), ("memory", "250Mi")], &[], 1);
        let live = live_configuration("auth", &d).unwrap();
        assert_eq!(live.cpu_request_millis, 250);
        assert_eq!(live.memory_request_mib, 250);
    }

    #[test]
    fn test_live_configuration_without_containers() {
        let mut d = deployment(&[], &[], 1);
        if let Some(pod) = d.spec.as_mut().and_then(|s| s.template.spec.as_mut()) {
            pod.containers.clear();
        }
        assert!(matches!(
            live_configuration("auth", &d),
            Err(DeploymentError::MissingResources { .. })
        ));
    }

    #[test]
    fn test_live_configuration_bad_quantity() {
        let d = deployment(&[("cpu", "fast")], &[], 1);
        assert!(matches!(
            live_configuration("auth", &d),
            Err(DeploymentError::Quantity { .. })
        ));
    }

    #[test]
    fn test_apply_tier_sets_requests_equal_limits() {
        let mut d = deployment(
            &[("cpu", "100m"), ("memory", "128Mi")],
            &[("cpu", "50m"), ("memory", "64Mi"), ("ephemeral-storage", "1Gi")],
            1,
        );
        let target = ResourceTier::new(250, 500, 2);
        apply_tier("auth", &mut d, &target).unwrap();

        let live = live_configuration("auth", &d).unwrap();
        assert!(live.matches(&target));

        // Unmanaged resources are left in place
        let requests = d.spec.unwrap().template.spec.unwrap().containers[0]
            .resources
            .clone()
            .unwrap()
            .requests
            .unwrap();
        assert_eq!(requests["ephemeral-storage"], Quantity("1Gi".to_string()));
        assert_eq!(requests["cpu"], Quantity("250m".to_string()));
    }

    #[test]
    fn test_apply_tier_rejects_unrepresentable_replicas() {
        let mut d = deployment(&[("cpu", "250m"), ("memory", "500Mi")], &[], 2);
        let target = ResourceTier::new(250, 500, 1 << 31);

        let err = apply_tier("auth", &mut d, &target).unwrap_err();
        assert!(matches!(
            err,
            DeploymentError::ReplicasOutOfRange { replicas, .. } if replicas == 1 << 31
        ));
        // Nothing was written
        assert_eq!(live_configuration("auth", &d).unwrap().replicas, 2);

        let ceiling = ResourceTier::new(250, 500, i32::MAX as u32);
        apply_tier("auth", &mut d, &ceiling).unwrap();
        assert_eq!(d.spec.as_ref().unwrap().replicas, Some(i32::MAX));
    }

    #[test]
    fn test_apply_tier_creates_missing_resources() {
        let mut d = deployment(&[], &[], 1);
        if let Some(container) = d
            .spec
            .as_mut()
            .and_then(|s| s.template.spec.as_mut())
            .and_then(|p| p.containers.first_mut())
        {
            container.resources = None;
        }

        apply_tier("auth", &mut d, &ResourceTier::new(250, 250, 1)).unwrap();
        let live = live_configuration("auth", &d).unwrap();
        assert!(live.matches(&ResourceTier::new(250, 250, 1)));
    }
}

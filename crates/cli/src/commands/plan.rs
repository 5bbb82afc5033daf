//! Inspect a service's live tier and its neighbours

use anyhow::{bail, Context, Result};
use colored::Colorize;
use controller_lib::executor::{DeploymentClient, KubeDeployments};
use controller_lib::scaling::{PlanOutcome, ScalePlanner};
use controller_lib::{ControllerConfig, ScaleDirection, ServiceMeans, ServiceObservation};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::json;
use std::path::Path;

use crate::output::{color_utility, format_target, print_json, OutputFormat};

async fn kube_client(kubeconfig: Option<&Path>) -> Result<Client> {
    match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            let config =
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .context("Failed to load kubeconfig")?;
            Client::try_from(config).context("Failed to create Kubernetes client")
        }
        None => Client::try_default()
            .await
            .context("Failed to create Kubernetes client"),
    }
}

/// Show the live tier of `service`, and optionally what the planner
/// would do given a utility and CPU reading
pub async fn show_plan(
    config: &ControllerConfig,
    kubeconfig: Option<&Path>,
    service: &str,
    reading: Option<(f64, f64)>,
    format: OutputFormat,
) -> Result<()> {
    if !config.services.iter().any(|s| s == service) {
        bail!(
            "'{}' is not a managed service (expected one of: {})",
            service,
            config.services.join(", ")
        );
    }

    let catalog = config.tier_catalog()?;
    let client = kube_client(kubeconfig).await?;
    let deployments = KubeDeployments::new(client, &config.namespace);

    let live = deployments
        .read(service)
        .await
        .with_context(|| format!("Failed to read deployment {}", service))?;
    let current = live.tier();
    let up = catalog.next(&current, ScaleDirection::Up);
    let down = catalog.next(&current, ScaleDirection::Down);

    let outcome = reading.map(|(utility, cpu_percent)| {
        let observation = ServiceObservation {
            service: service.to_string(),
            means: ServiceMeans {
                cpu_percent,
                ..Default::default()
            },
            utility,
            live,
        };
        (utility, ScalePlanner::new(config.policy).plan(&observation, &catalog))
    });

    match format {
        OutputFormat::Json => {
            let planned = outcome.as_ref().map(|(utility, outcome)| match outcome {
                PlanOutcome::Apply(plan) => json!({ "utility": utility, "apply": plan }),
                PlanOutcome::Hold(reason) => json!({ "utility": utility, "hold": reason }),
                PlanOutcome::AtBound(direction) => {
                    json!({ "utility": utility, "at_bound": direction })
                }
            });
            print_json(&json!({
                "service": service,
                "namespace": config.namespace,
                "live": live,
                "tier": catalog.describe(&current),
                "up": up,
                "down": down,
                "plan": planned,
            }));
        }
        OutputFormat::Table => {
            println!("{}", format!("Service: {}", service).bold());
            println!("{}", "=".repeat(60));
            println!(
                "Requests:  cpu {}m, memory {}Mi",
                live.cpu_request_millis, live.memory_request_mib
            );
            println!(
                "Limits:    cpu {}m, memory {}Mi",
                live.cpu_limit_millis, live.memory_limit_mib
            );
            println!("Replicas:  {}", live.replicas);
            println!("Tier:      {}", catalog.describe(&current).cyan());
            println!();
            println!("Next up:   {}", format_target(up));
            println!("Next down: {}", format_target(down));

            if let Some((utility, outcome)) = outcome {
                println!();
                println!("Utility:   {}", color_utility(utility, &config.policy));
                match outcome {
                    PlanOutcome::Apply(plan) => println!(
                        "Plan:      {} {} -> {} ({})",
                        plan.direction.to_string().green(),
                        plan.from,
                        plan.to,
                        plan.reason
                    ),
                    PlanOutcome::Hold(reason) => println!("Plan:      hold ({})", reason),
                    PlanOutcome::AtBound(direction) => println!(
                        "Plan:      {}",
                        format!("no tier {} from here", direction).yellow()
                    ),
                }
            }
        }
    }

    Ok(())
}

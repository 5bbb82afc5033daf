//! Controller configuration
//!
//! Every field has a default, so an empty configuration runs the stock
//! acmeair deployment. Values are layered from an optional file and then
//! `TIER_`-prefixed environment variables, with `__` separating nested
//! keys (`TIER_POLICY__UPSCALE_BELOW_UTILITY=0.6`).

use crate::control::PacingConfig;
use crate::error::ConfigError;
use crate::scaling::{default_tier_specs, ScalePolicy, TierCatalog, TierSpec, UtilityWeights};
use crate::telemetry::{
    default_metric_groups, MetricGroup, QueryWindow, SysdigConfig, DEFAULT_ERROR_STATUS_CODES,
};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment variables read by [`ControllerConfig::load`]
pub const ENV_PREFIX: &str = "TIER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Namespace holding the managed Deployments
    pub namespace: String,
    /// Deployments under control, in evaluation order
    pub services: Vec<String>,
    /// Tiers from smallest to largest
    pub catalog: Vec<TierSpec>,
    pub utility: UtilityWeights,
    pub policy: ScalePolicy,
    pub window: QueryWindow,
    pub pacing: PacingConfig,
    pub telemetry: SysdigConfig,
    /// HTTP status codes counted as errors
    pub error_status_codes: Vec<u16>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: "acmeair-g2".to_string(),
            services: [
                "acmeair-bookingservice",
                "acmeair-customerservice",
                "acmeair-flightservice",
                "acmeair-authservice",
                "acmeair-mainservice",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            catalog: default_tier_specs(),
            utility: UtilityWeights::default(),
            policy: ScalePolicy::default(),
            window: QueryWindow::default(),
            pacing: PacingConfig::default(),
            telemetry: SysdigConfig::default(),
            error_status_codes: DEFAULT_ERROR_STATUS_CODES.to_vec(),
        }
    }
}

impl ControllerConfig {
    /// Load from an optional file plus the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading variables from `env` instead of
    /// the process environment when given
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config: ControllerConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("services")
                    .with_list_parse_key("error_status_codes")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.services.is_empty() {
            return Err(ConfigError::NoServices);
        }
        self.tier_catalog()?;
        self.utility.validate()?;
        self.window.validate()?;
        Ok(())
    }

    /// Parse the configured tiers into a validated catalog
    pub fn tier_catalog(&self) -> Result<TierCatalog, ConfigError> {
        TierCatalog::from_specs(&self.catalog)
    }

    /// Metric groups queried each iteration
    pub fn metric_groups(&self) -> Vec<MetricGroup> {
        default_metric_groups(&self.namespace, &self.error_status_codes)
    }
}

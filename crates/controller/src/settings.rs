//! Process settings for the controller binary
//!
//! Controller behaviour lives in [`controller_lib::ControllerConfig`]; these
//! settings only locate that configuration and the API listener.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Prefix of the environment variables read by [`ServerSettings::load`]
pub const ENV_PREFIX: &str = "TIER_SERVER";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Optional configuration file layered under the `TIER_` environment
    #[serde(default)]
    pub config_file: Option<PathBuf>,
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            config_file: None,
        }
    }
}

impl ServerSettings {
    /// Load settings from `TIER_SERVER_*` environment variables
    pub fn load() -> Result<Self> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()
            .context("Invalid TIER_SERVER_* settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ServerSettings::default();
        assert_eq!(settings.api_port, 8080);
        assert!(settings.config_file.is_none());
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: ServerSettings =
            serde_json::from_str(r#"{"config_file": "/etc/tier/controller.toml"}"#).unwrap();
        assert_eq!(settings.api_port, 8080);
        assert_eq!(
            settings.config_file,
            Some(PathBuf::from("/etc/tier/controller.toml"))
        );
    }
}

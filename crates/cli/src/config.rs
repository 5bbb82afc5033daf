//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Defaults read from `~/.config/tierctl/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    /// Controller health/metrics endpoint
    pub controller_url: Option<String>,
    /// Controller configuration file to read catalog and telemetry settings from
    pub controller_config: Option<PathBuf>,
}

impl CliConfig {
    /// Load the user configuration, or defaults if none exists
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        serde_json::from_str(&content).context("Failed to parse config file")
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|dir| dir.join("tierctl").join("config.json"))
    }
}

//! HTTP client for a Sysdig-compatible data API
//!
//! Posts one data query per metric group to `/api/data/` and decodes the
//! row-oriented response. Error bodies are passed through untouched.

use super::{DataRequest, MetricGroup, QueryWindow, TelemetryResponse, TelemetrySource};
use crate::error::FetchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Header carrying the monitoring instance id
const INSTANCE_ID_HEADER: &str = "IBMInstanceID";

/// Connection settings for the telemetry backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysdigConfig {
    /// Base URL of the monitoring instance
    pub url: String,
    /// Bearer token sent with every query
    pub api_token: Option<String>,
    /// Monitoring instance id, if the backend is multi-tenant
    pub instance_id: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SysdigConfig {
    fn default() -> Self {
        Self {
            url: "https://ca-tor.monitoring.cloud.ibm.com".to_string(),
            api_token: None,
            instance_id: None,
            timeout_secs: 30,
        }
    }
}

/// Telemetry source backed by the data API
pub struct SysdigClient {
    client: Client,
    data_url: Url,
    config: SysdigConfig,
}

impl SysdigClient {
    /// Create a new client
    pub fn new(config: SysdigConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let data_url = Url::parse(&config.url)
            .and_then(|base| base.join("api/data/"))
            .context("Invalid telemetry URL")?;

        Ok(Self {
            client,
            data_url,
            config,
        })
    }

    pub fn data_url(&self) -> &Url {
        &self.data_url
    }
}

#[async_trait]
impl TelemetrySource for SysdigClient {
    async fn fetch(
        &self,
        group: &MetricGroup,
        window: &QueryWindow,
    ) -> Result<TelemetryResponse, FetchError> {
        let body = DataRequest::new(group, window, chrono::Utc::now().timestamp());

        let mut request = self.client.post(self.data_url.clone()).json(&body);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }
        if let Some(instance_id) = &self.config.instance_id {
            request = request.header(INSTANCE_ID_HEADER, instance_id);
        }

        debug!(group = %group.name, filter = %group.filter, "Querying telemetry backend");

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Backend { status, body });
        }

        response
            .json::<TelemetryResponse>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

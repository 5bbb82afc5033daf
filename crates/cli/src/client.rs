//! HTTP client for the controller's health endpoints

use anyhow::{Context, Result};
use controller_lib::{HealthResponse, ReadinessResponse};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Client for a running tier-controller
pub struct ControllerClient {
    client: Client,
    base_url: Url,
}

/// A probe answer; non-2xx bodies still carry the probe payload
#[derive(Debug)]
pub struct Probe<T> {
    pub status: StatusCode,
    pub body: T,
}

impl ControllerClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid controller URL")?;

        Ok(Self { client, base_url })
    }

    pub async fn health(&self) -> Result<Probe<HealthResponse>> {
        self.probe("healthz").await
    }

    pub async fn readiness(&self) -> Result<Probe<ReadinessResponse>> {
        self.probe("readyz").await
    }

    async fn probe<T: DeserializeOwned>(&self, path: &str) -> Result<Probe<T>> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to reach controller")?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Controller error ({}): {}", status, body);
        }

        let body = response
            .json()
            .await
            .context("Failed to parse controller response")?;
        Ok(Probe { status, body })
    }
}

//! HTTP client for a running controller's API

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

/// Client for the controller's status and health endpoints
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// GET `path`, failing on any non-2xx status
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (status, body) = self.get_probe(path).await?;
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, body);
        }
        serde_json::from_str(&body).context("Failed to parse response")
    }

    /// GET a probe endpoint. `503 Service Unavailable` still carries a
    /// readable body, so it is returned rather than treated as an error.
    pub async fn get_probe_json<T: DeserializeOwned>(&self, path: &str) -> Result<(StatusCode, T)> {
        let (status, body) = self.get_probe(path).await?;
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            anyhow::bail!("API error ({}): {}", status, body);
        }
        let parsed = serde_json::from_str(&body).context("Failed to parse response")?;
        Ok((status, parsed))
    }

    async fn get_probe(&self, path: &str) -> Result<(StatusCode, String)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok((status, body))
    }
}

//! Announcements for newly created clusters
//!
//! Delivery failures are logged by the caller and never fail the create
//! action that triggered them.

use crate::models::ClusterAccess;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Receives cluster lifecycle announcements
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announce access details for a cluster that was just provisioned
    async fn cluster_created(&self, archetype: &str, access: &ClusterAccess) -> Result<()>;
}

/// Chat webhook message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
}

impl ChatMessage {
    pub fn cluster_created(archetype: &str, access: &ClusterAccess) -> Self {
        Self {
            text: format!(
                "New {} cluster `{}` is ready.\nLogin: `kubeadmin` / `{}`\nKubeconfig: `{}`",
                archetype, access.cluster_name, access.kubeadmin_password, access.kubeconfig_path
            ),
        }
    }
}

/// Posts announcements to an incoming chat webhook
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create webhook HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn cluster_created(&self, archetype: &str, access: &ClusterAccess) -> Result<()> {
        let message = ChatMessage::cluster_created(archetype, access);

        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .context("Failed to send webhook request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Webhook error ({}): {}", status, body);
        }

        Ok(())
    }
}

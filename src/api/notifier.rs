//! Notification sinks.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use super::error::{GatewayError, GatewayResult};
use super::NotificationSink;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    text: &'a str,
}

/// Posts `{title, text}` JSON to a webhook URL.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn send(&self, title: &str, message: &str) -> GatewayResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload {
                title,
                text: message,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Writes notifications to the log when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(&self, title: &str, message: &str) -> GatewayResult<()> {
        info!(title = %title, "{}", message);
        Ok(())
    }
}

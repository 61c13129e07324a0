//! Expo push delivery.
//!
//! The orchestrator addresses people by email; devices are looked up through
//! the store and every registered token gets the same notification in one
//! batch request.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::{BasePushNotificationService, BaseStore};

const EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

/// Expo Push Notification Client
pub struct ExpoClient {
    client: Client,
    access_token: Option<String>,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct ExpoMessage<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a serde_json::Value,
    sound: &'static str,
}

#[derive(Debug, Deserialize)]
struct ExpoResponse {
    data: Vec<ExpoTicket>,
}

#[derive(Debug, Deserialize)]
struct ExpoTicket {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

impl ExpoClient {
    pub fn new(access_token: Option<String>) -> Self {
        Self::with_endpoint(access_token, EXPO_PUSH_URL)
    }

    pub fn with_endpoint(access_token: Option<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            access_token,
            endpoint: endpoint.into(),
        }
    }

    /// Send one notification to several device tokens. Fails if Expo rejects
    /// the request or every ticket errors; partial ticket errors are logged.
    pub async fn send_batch(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> Result<()> {
        if tokens.is_empty() {
            return Ok(());
        }

        let messages: Vec<ExpoMessage<'_>> = tokens
            .iter()
            .map(|token| ExpoMessage {
                to: token,
                title,
                body,
                data,
                sound: "default",
            })
            .collect();

        let mut request = self.client.post(&self.endpoint).json(&messages);

        // Access token raises Expo's rate limits
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("Expo push request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "Expo push rejected");
            anyhow::bail!("Expo push API error {}: {}", status, body);
        }

        let expo_response: ExpoResponse = response
            .json()
            .await
            .context("Failed to decode Expo push response")?;

        let failed: Vec<&ExpoTicket> = expo_response
            .data
            .iter()
            .filter(|ticket| ticket.status == "error")
            .collect();

        if !failed.is_empty() && failed.len() == expo_response.data.len() {
            anyhow::bail!(
                "Expo rejected every ticket: {}",
                failed[0].message.as_deref().unwrap_or("unknown error")
            );
        }
        for ticket in &failed {
            error!(message = ?ticket.message, "Expo ticket error");
        }

        info!(sent = messages.len() - failed.len(), failed = failed.len(), "Expo notifications sent");
        Ok(())
    }
}

/// Push service resolving an email to its registered Expo tokens.
pub struct ExpoPushService {
    client: ExpoClient,
    store: Arc<dyn BaseStore>,
}

impl ExpoPushService {
    pub fn new(client: ExpoClient, store: Arc<dyn BaseStore>) -> Self {
        Self { client, store }
    }
}

#[async_trait]
impl BasePushNotificationService for ExpoPushService {
    async fn send_notification(
        &self,
        email: &str,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        let tokens = self.store.push_tokens(email).await?;
        if tokens.is_empty() {
            debug!(email = %email, "No push tokens registered, skipping");
            return Ok(());
        }
        self.client.send_batch(&tokens, title, body, &data).await
    }
}

/// Used when push is not configured: records the notification in the logs.
pub struct NoopPushService;

#[async_trait]
impl BasePushNotificationService for NoopPushService {
    async fn send_notification(
        &self,
        email: &str,
        title: &str,
        _body: &str,
        _data: serde_json::Value,
    ) -> Result<()> {
        info!(email = %email, title = %title, "Push disabled, notification not sent");
        Ok(())
    }
}

//! Transactional email delivery over a JSON HTTP API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use super::BaseEmailService;
use crate::config::EmailConfig;

/// Email client for providers that accept `{from, to, subject, html}` with a
/// bearer key (Resend, Postmark-compatible relays).
pub struct HttpEmailService {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

#[derive(Debug, Serialize)]
struct EmailPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

impl HttpEmailService {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl BaseEmailService for HttpEmailService {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let payload = EmailPayload {
            from: &self.from,
            to: [to],
            subject,
            html: body,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("Email request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(%status, to = %to, body = %text, "Email provider rejected message");
            anyhow::bail!("Email API error {}: {}", status, text);
        }

        info!(to = %to, subject = %subject, "Email sent");
        Ok(())
    }
}

/// Used when email is not configured.
pub struct LogEmailService;

#[async_trait]
impl BaseEmailService for LogEmailService {
    async fn send_email(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        info!(to = %to, subject = %subject, "Email disabled, message not sent");
        Ok(())
    }
}

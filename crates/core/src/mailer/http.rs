//! HTTP mail relay transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::error::MailError;
use super::traits::MailTransport;
use crate::config::HttpMailConfig;

/// JSON payload posted to the relay.
#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Sends mail by posting JSON to an HTTP relay endpoint.
pub struct HttpMailer {
    client: Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    /// Create a mailer for the relay described by `config`.
    pub fn new(config: &HttpMailConfig, from: impl Into<String>) -> Result<Self, MailError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MailError::Unreachable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl MailTransport for HttpMailer {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let message = RelayMessage {
            from: &self.from,
            to: recipient,
            subject,
            text: body,
        };

        let mut request = self.client.post(&self.url).json(&message);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MailError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!("Mail relay accepted message for {}", recipient);
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        if status.as_u16() == 422 {
            return Err(MailError::Rejected(message));
        }
        Err(MailError::Relay {
            status: status.as_u16(),
            message,
        })
    }
}

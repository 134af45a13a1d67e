use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::email::MailError;

/// One outbound email as the provider sees it.
#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Boundary to the email provider. Implementations must be safe for
/// concurrent use; the dispatcher shares one client across jobs.
#[async_trait]
pub trait EmailClient: Send + Sync {
    /// Sends one message and returns the provider-assigned delivery id.
    async fn send(&self, message: &EmailMessage) -> Result<String, MailError>;
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

/// HTTP client for the Resend API.
#[derive(Clone)]
pub struct ResendClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl ResendClient {
    pub fn new(api_key: &str) -> anyhow::Result<Self> {
        Self::with_base_url(api_key, "https://api.resend.com")
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> anyhow::Result<Self> {
        let http = Client::builder().user_agent("abeghelp-backend").build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EmailClient for ResendClient {
    async fn send(&self, message: &EmailMessage) -> Result<String, MailError> {
        let response = self
            .http
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Provider(format!("{status}: {body}")));
        }

        let body: SendResponse = response.json().await?;
        Ok(body.id)
    }
}

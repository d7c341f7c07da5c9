use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;

use plantdesk_core::config::MailerConfig;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("mail relay rejected the message: {0}")]
    Rejected(String),
    #[error("mail transport failure: {0}")]
    Transport(String),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), SendError>;
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts messages to the internal mail relay's JSON endpoint.
pub struct HttpApiSender {
    client: reqwest::Client,
    api_url: String,
    api_token: SecretString,
    from_address: String,
}

impl HttpApiSender {
    pub fn new(config: &MailerConfig) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| SendError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_token: config.api_token.clone(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl EmailSender for HttpApiSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), SendError> {
        let payload = RelayPayload {
            from: &self.from_address,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.api_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|error| SendError::Transport(error.to_string()))?;

        if !response.status().is_success() {
            return Err(SendError::Rejected(format!(
                "relay returned {} for recipient {}",
                response.status(),
                message.to
            )));
        }

        Ok(())
    }
}

/// Records sent messages, optionally failing every send. For tests.
#[derive(Clone, Default)]
pub struct InMemoryEmailSender {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failure: Option<String>,
}

impl InMemoryEmailSender {
    pub fn failing(message: impl Into<String>) -> Self {
        Self { sent: Arc::default(), failure: Some(message.into()) }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl EmailSender for InMemoryEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), SendError> {
        if let Some(failure) = &self.failure {
            return Err(SendError::Transport(failure.clone()));
        }
        match self.sent.lock() {
            Ok(mut sent) => sent.push(message.clone()),
            Err(poisoned) => poisoned.into_inner().push(message.clone()),
        }
        Ok(())
    }
}

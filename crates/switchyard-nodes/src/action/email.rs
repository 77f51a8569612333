//! `send_email`
//!
//! Delivery goes through a [`Mailer`]. The built-in [`HttpMailer`] posts the
//! message as JSON to a relay endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use switchyard_engine::config::EmailConfig;
use switchyard_engine::{EngineError, HandlerInput, NodeHandler, NodeType, Result};

use crate::data::{parse_rules, OneOrMany};
use crate::transform::iso;

/// One outbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub message: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Mailer backed by an HTTP relay
pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: String,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn new(client: reqwest::Client, relay_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            relay_url: relay_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let mut request = self.client.post(&self.relay_url).json(message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::handler(format!("mail relay {} unreachable: {}", self.relay_url, e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::handler(format!("mail relay returned {}: {}", status, body)));
        }
        Ok(())
    }
}

/// Mailer used when no relay is configured
struct UnconfiguredMailer;

#[async_trait]
impl Mailer for UnconfiguredMailer {
    async fn send(&self, _message: &EmailMessage) -> Result<()> {
        Err(EngineError::config("send_email requires email.relay_url to be configured"))
    }
}

/// Mailer for the given config, failing every send when no relay is set
pub fn mailer_from_config(client: reqwest::Client, config: &EmailConfig) -> Arc<dyn Mailer> {
    match config.relay_url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => Arc::new(HttpMailer::new(client, url, config.api_key.clone())),
        None => Arc::new(UnconfiguredMailer),
    }
}

#[derive(Debug, Deserialize)]
struct EmailConfigRules {
    #[serde(default)]
    from: Option<String>,
    to: OneOrMany<String>,
    #[serde(default)]
    subject: String,
    #[serde(default, alias = "body")]
    message: String,
}

pub struct EmailHandler {
    mailer: Arc<dyn Mailer>,
    default_from: Option<String>,
}

impl EmailHandler {
    pub fn new(mailer: Arc<dyn Mailer>, default_from: Option<String>) -> Self {
        Self { mailer, default_from }
    }
}

#[async_trait]
impl NodeHandler for EmailHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value> {
        let rules: EmailConfigRules = parse_rules(NodeType::SendEmail, &input.resolved_config(false)?)?;
        let to: Vec<String> = rules
            .to
            .into_vec()
            .into_iter()
            .filter(|addr| !addr.trim().is_empty())
            .collect();
        if to.is_empty() {
            return Err(EngineError::config("send_email requires at least one recipient in 'to'"));
        }
        let from = rules
            .from
            .filter(|f| !f.trim().is_empty())
            .or_else(|| self.default_from.clone())
            .ok_or_else(|| EngineError::config("send_email requires 'from' or email.default_from"))?;

        let message = EmailMessage {
            from,
            to,
            subject: rules.subject,
            message: rules.message,
        };
        self.mailer.send(&message).await?;
        log::info!("Node '{}' sent email to {}", input.node.id, message.to.join(", "));

        Ok(json!({
            "from": message.from,
            "to": message.to,
            "subject": message.subject,
            "message": message.message,
            "status": "sent",
            "timestamp": iso(&Utc::now()),
        }))
    }
}

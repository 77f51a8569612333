//! `send_http_request`

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use switchyard_engine::{EngineError, HandlerInput, NodeHandler, NodeType, Result};

use crate::data::parse_rules;

#[derive(Debug, Deserialize)]
struct HttpRequestConfig {
    #[serde(default = "default_method")]
    method: String,
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, Value>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default, alias = "query")]
    params: BTreeMap<String, Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl HttpRequestConfig {
    fn method(&self) -> Result<Method> {
        Method::from_bytes(self.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| EngineError::config(format!("invalid HTTP method '{}'", self.method)))
    }
}

fn header_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Sends one HTTP request built from the resolved node config
pub struct HttpRequestHandler {
    client: reqwest::Client,
}

impl HttpRequestHandler {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeHandler for HttpRequestHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value> {
        let config: HttpRequestConfig = parse_rules(NodeType::SendHttpRequest, &input.resolved_config(false)?)?;
        if config.url.trim().is_empty() {
            return Err(EngineError::config("send_http_request requires a 'url'"));
        }
        let method = config.method()?;

        let mut request = self.client.request(method.clone(), &config.url);
        for (name, value) in &config.headers {
            request = request.header(name.as_str(), header_text(value));
        }
        if !config.params.is_empty() {
            let params: Vec<(&str, String)> = config
                .params
                .iter()
                .map(|(k, v)| (k.as_str(), header_text(v)))
                .collect();
            request = request.query(&params);
        }
        if let Some(body) = config.body.as_ref().filter(|b| !b.is_null()) {
            request = request.json(body);
        }

        log::debug!("Node '{}' sending {} {}", input.node.id, method, config.url);
        let response = request.send().await.map_err(|e| {
            EngineError::handler(format!("request to {} failed: {}", config.url, e))
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EngineError::handler(format!("failed to read response from {}: {}", config.url, e)))?;
        if !status.is_success() {
            return Err(EngineError::handler(format!(
                "{} {} returned {}: {}",
                method, config.url, status, text
            )));
        }

        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Ok(json!({
            "url": config.url,
            "method": method.as_str(),
            "body": config.body,
            "status": "success",
            "response": body,
            "response_code": status.as_u16(),
        }))
    }
}

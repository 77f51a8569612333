//! Action handlers
//!
//! Side-effecting leaf nodes. The engine wraps their output as
//! `{name, result, retry_attempts}` and retries them per node, so a handler
//! returns `Err` for anything worth retrying.

mod database;
mod email;
mod http;

pub use database::{Database, InMemoryDatabase, UpdateDatabaseHandler};
pub use email::{mailer_from_config, EmailHandler, EmailMessage, HttpMailer, Mailer};
pub use http::HttpRequestHandler;

use std::time::Duration;

use switchyard_engine::config::HttpConfig;
use switchyard_engine::{EngineError, Result};

/// Shared client for every outbound call made by the built-in handlers
pub fn http_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in &config.default_headers {
        let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| EngineError::config(format!("invalid default header '{}': {}", name, e)))?;
        let value = reqwest::header::HeaderValue::from_str(value)
            .map_err(|e| EngineError::config(format!("invalid value for header '{}': {}", name, e)))?;
        headers.insert(name, value);
    }
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .default_headers(headers)
        .build()
        .map_err(|e| EngineError::config(format!("failed to build HTTP client: {}", e)))
}

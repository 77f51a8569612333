//! Engine configuration storage
//!
//! Execution limits, sandbox limits and the endpoints used by the action
//! handlers, persisted as a single JSON document.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::constants;
use crate::sandbox::SandboxLimits;

/// Traversal and retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Cap applied to every node's `retry_attempts`
    pub max_retry_attempts: u32,
    /// Cap applied to every node's `retry_delay_ms`
    pub max_retry_delay_ms: u64,
    /// Optional hard stop for `while_loop` nodes that set no `max_iterations`.
    /// `None` leaves termination entirely to the exit condition.
    pub max_while_iterations: Option<u32>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_retry_attempts: constants::retry::MAX_ATTEMPTS,
            max_retry_delay_ms: constants::retry::MAX_DELAY_MS,
            max_while_iterations: None,
        }
    }
}

/// Sandbox configuration for code block nodes
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SandboxConfig {
    /// Default limits, overridable per node
    pub limits: SandboxLimits,
    /// Scratch directory for source files (system temp dir when unset)
    pub work_dir: Option<String>,
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    /// Headers added to every outbound request
    pub default_headers: std::collections::BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: constants::timeouts::HTTP_SECS,
            default_headers: Default::default(),
        }
    }
}

/// Mail relay used by `send_email` nodes
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EmailConfig {
    /// HTTP endpoint that accepts a JSON message and delivers it
    pub relay_url: Option<String>,
    /// Sender used when a node leaves `from` empty
    pub default_from: Option<String>,
    /// Bearer token for the relay
    pub api_key: Option<String>,
}

/// Rule engine used by `rule_executor` nodes
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RuleEngineConfig {
    /// Base URL; rulesets are evaluated at `{base_url}/rulesets/{id}/evaluate`
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

/// Full engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub rule_engine: RuleEngineConfig,
}

impl EngineConfig {
    /// Load configuration from a JSON file, falling back to defaults when absent
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::debug!("No engine config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).await.map_err(ConfigError::Io)?;

        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save configuration to a JSON file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(ConfigError::Io)?;
        }

        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        fs::write(path, contents).await.map_err(ConfigError::Io)?;

        log::info!("Engine configuration saved to {:?}", path);
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::load(dir.path().join("engine.json")).await.unwrap();
        assert_eq!(config.sandbox.limits.timeout_ms, constants::sandbox::TIMEOUT_MS);
        assert_eq!(config.execution.max_retry_attempts, constants::retry::MAX_ATTEMPTS);
        assert!(config.execution.max_while_iterations.is_none());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("engine.json");

        let mut config = EngineConfig::default();
        config.http.timeout_secs = 5;
        config.execution.max_while_iterations = Some(50);
        config.rule_engine.base_url = Some("http://rules.local".into());
        config.save(&path).await.unwrap();

        let loaded = EngineConfig::load(&path).await.unwrap();
        assert_eq!(loaded.http.timeout_secs, 5);
        assert_eq!(loaded.execution.max_while_iterations, Some(50));
        assert_eq!(loaded.rule_engine.base_url.as_deref(), Some("http://rules.local"));
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"sandbox": {"limits": {"timeout_ms": 250}}}"#).unwrap();
        assert_eq!(config.sandbox.limits.timeout_ms, 250);
        assert_eq!(config.sandbox.limits.memory_limit_kb, constants::sandbox::MEMORY_LIMIT_KB);
        assert_eq!(config.http.timeout_secs, constants::timeouts::HTTP_SECS);
    }
}

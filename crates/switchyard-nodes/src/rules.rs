//! `rule_executor`
//!
//! Evaluates a remote ruleset and reports `rule_evaluation_result`, which the
//! engine turns into the `on_true` / `on_false` branch.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use switchyard_engine::config::RuleEngineConfig;
use switchyard_engine::{EngineError, HandlerInput, NodeHandler, NodeType, Result};

use crate::data::parse_rules;

/// Outcome of one ruleset evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluation {
    pub passed: bool,
    /// Full evaluator response
    pub details: Value,
}

#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    async fn evaluate(&self, ruleset_id: &str, payload: &Value) -> Result<RuleEvaluation>;
}

/// Evaluator backed by `POST {base_url}/rulesets/{id}/evaluate`
pub struct HttpRuleEvaluator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRuleEvaluator {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &RuleEngineConfig) -> Option<Self> {
        config
            .base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| Self::new(client, url, config.api_key.clone()))
    }

    fn url(&self, ruleset_id: &str) -> String {
        format!("{}/rulesets/{}/evaluate", self.base_url, ruleset_id)
    }
}

/// Read the pass flag from an evaluator response
fn passed_flag(response: &Value) -> Option<bool> {
    response
        .pointer("/evaluationSummary/passed")
        .or_else(|| response.get("passed"))
        .and_then(Value::as_bool)
}

#[async_trait]
impl RuleEvaluator for HttpRuleEvaluator {
    async fn evaluate(&self, ruleset_id: &str, payload: &Value) -> Result<RuleEvaluation> {
        let url = self.url(ruleset_id);
        let mut request = self.client.post(&url).json(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::handler(format!("rule engine at {} unreachable: {}", url, e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::handler(format!(
                "rule engine returned {} for ruleset '{}': {}",
                status, ruleset_id, body
            )));
        }
        let details: Value = response
            .json()
            .await
            .map_err(|e| EngineError::handler(format!("invalid rule engine response: {}", e)))?;
        let passed = passed_flag(&details).ok_or_else(|| {
            EngineError::handler(format!("rule engine response for '{}' has no pass flag", ruleset_id))
        })?;
        Ok(RuleEvaluation { passed, details })
    }
}

struct UnconfiguredEvaluator;

#[async_trait]
impl RuleEvaluator for UnconfiguredEvaluator {
    async fn evaluate(&self, _ruleset_id: &str, _payload: &Value) -> Result<RuleEvaluation> {
        Err(EngineError::config("rule_executor requires rule_engine.base_url to be configured"))
    }
}

/// Evaluator for the given config, failing every call when no base URL is set
pub fn evaluator_from_config(client: reqwest::Client, config: &RuleEngineConfig) -> Arc<dyn RuleEvaluator> {
    match HttpRuleEvaluator::from_config(client, config) {
        Some(evaluator) => Arc::new(evaluator),
        None => Arc::new(UnconfiguredEvaluator),
    }
}

#[derive(Debug, Deserialize)]
struct RuleExecutorConfig {
    #[serde(alias = "rule_id", alias = "rulesetId")]
    ruleset_id: String,
    #[serde(default)]
    payload: Option<Value>,
}

pub struct RuleExecutorHandler {
    evaluator: Arc<dyn RuleEvaluator>,
}

impl RuleExecutorHandler {
    pub fn new(evaluator: Arc<dyn RuleEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl NodeHandler for RuleExecutorHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value> {
        let config: RuleExecutorConfig = parse_rules(NodeType::RuleExecutor, &input.resolved_config(false)?)?;
        if config.ruleset_id.trim().is_empty() {
            return Err(EngineError::config("rule_executor requires a 'ruleset_id'"));
        }
        // Without an explicit payload the whole context is evaluated
        let payload = config.payload.unwrap_or_else(|| input.context.clone());
        let evaluation = self.evaluator.evaluate(&config.ruleset_id, &payload).await?;
        log::debug!(
            "Node '{}' ruleset '{}' passed={}",
            input.node.id,
            config.ruleset_id,
            evaluation.passed
        );
        Ok(json!({
            "rule_evaluation_result": evaluation.passed,
            "ruleset_id": config.ruleset_id,
            "evaluation": evaluation.details,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_input;
    use parking_lot::Mutex;

    /// Passes when `payload.score` meets the threshold
    struct ThresholdEvaluator {
        threshold: i64,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RuleEvaluator for ThresholdEvaluator {
        async fn evaluate(&self, ruleset_id: &str, payload: &Value) -> Result<RuleEvaluation> {
            self.calls.lock().push(ruleset_id.to_string());
            let score = payload.get("score").and_then(Value::as_i64).unwrap_or(0);
            Ok(RuleEvaluation {
                passed: score >= self.threshold,
                details: json!({"score": score}),
            })
        }
    }

    #[tokio::test]
    async fn test_reports_branch_flag() {
        let evaluator = Arc::new(ThresholdEvaluator {
            threshold: 50,
            calls: Mutex::new(Vec::new()),
        });
        let handler = RuleExecutorHandler::new(evaluator.clone());

        let input = test_input(
            NodeType::RuleExecutor,
            json!({"rule_id": "credit", "payload": {"score": "{{ input.score }}"}}),
            json!({"input": {"score": 72}}),
            None,
        );
        let out = handler.handle(input).await.unwrap();
        assert_eq!(out["rule_evaluation_result"], true);
        assert_eq!(out["ruleset_id"], "credit");

        let input = test_input(NodeType::RuleExecutor, json!({"ruleset_id": "credit"}), json!({"score": 10}), None);
        assert_eq!(handler.handle(input).await.unwrap()["rule_evaluation_result"], false);
        assert_eq!(evaluator.calls.lock().len(), 2);
    }

    #[test]
    fn test_pass_flag_and_url() {
        assert_eq!(passed_flag(&json!({"evaluationSummary": {"passed": false}, "passed": true})), Some(false));
        assert_eq!(passed_flag(&json!({"passed": true})), Some(true));
        assert_eq!(passed_flag(&json!({"result": "ok"})), None);

        let evaluator = HttpRuleEvaluator::new(reqwest::Client::new(), "http://rules.local/", None);
        assert_eq!(evaluator.url("r1"), "http://rules.local/rulesets/r1/evaluate");
        assert!(HttpRuleEvaluator::from_config(reqwest::Client::new(), &RuleEngineConfig::default()).is_none());
    }
}

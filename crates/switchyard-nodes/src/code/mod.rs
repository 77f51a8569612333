//! `code_block`
//!
//! Runs user source through a [`CodeSandbox`]. Placeholders in the source are
//! resolved strictly against the context (with `data` bound to the source
//! value), and stdout is parsed as JSON when it can be.

mod languages;
mod sandbox;

pub use languages::Language;
pub use sandbox::ProcessSandbox;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use switchyard_engine::template::resolve_str;
use switchyard_engine::{CodeSandbox, EngineError, HandlerInput, NodeHandler, NodeType, Result, SandboxLimits};

use crate::data::{parse_rules, source_data, with_data};
use crate::transform::transform_output;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CodeBlockConfig {
    language: String,
    #[serde(alias = "expression")]
    code: String,
    #[serde(default)]
    stdin: Option<Value>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    memory_limit: Option<u64>,
    #[serde(default)]
    cpu_time: Option<u64>,
}

pub struct CodeBlockHandler {
    sandbox: Arc<dyn CodeSandbox>,
    limits: SandboxLimits,
}

impl CodeBlockHandler {
    pub fn new(sandbox: Arc<dyn CodeSandbox>, limits: SandboxLimits) -> Self {
        Self { sandbox, limits }
    }
}

fn stdin_text(value: &Value) -> Result<String> {
    Ok(match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other)?,
    })
}

#[async_trait]
impl NodeHandler for CodeBlockHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value> {
        let config: CodeBlockConfig = parse_rules(NodeType::CodeBlock, &input.node.config)?;
        if config.code.trim().is_empty() {
            return Err(EngineError::config("code_block requires 'code'"));
        }
        let data = source_data(&input)?;
        let scope = with_data(&input.context, &data, None);

        let source = match resolve_str(&config.code, &scope, true)? {
            Value::String(s) => s,
            other => serde_json::to_string(&other)?,
        };
        let stdin = match &config.stdin {
            Some(Value::String(template)) => Some(stdin_text(&resolve_str(template, &scope, true)?)?),
            Some(Value::Null) | None => None,
            Some(other) => Some(stdin_text(other)?),
        };
        let limits = self
            .limits
            .with_overrides(config.timeout, config.memory_limit, config.cpu_time);

        log::debug!(
            "Node '{}' running {} code ({} ms limit)",
            input.node.id,
            config.language,
            limits.timeout_ms
        );
        let execution = self
            .sandbox
            .execute(&source, &config.language, &limits, stdin.as_deref())
            .await?;

        if execution.timed_out {
            return Err(EngineError::SandboxTimeout(limits.timeout_ms));
        }
        if !execution.success {
            return Err(EngineError::handler(format!(
                "{} code exited with {:?}: {}",
                config.language,
                execution.exit_code,
                execution.error.as_deref().unwrap_or("").trim()
            )));
        }

        let trimmed = execution.output.trim();
        let result = serde_json::from_str::<Value>(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()));
        let mut output = transform_output(NodeType::CodeBlock, result);
        output["language"] = json!(config.language);
        output["execution"] = serde_json::to_value(&execution)?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_input;
    use parking_lot::Mutex;
    use switchyard_engine::CodeExecutionResult;

    /// Echoes the source back as stdout and records the limits it saw
    #[derive(Default)]
    struct EchoSandbox {
        seen: Mutex<Vec<(String, SandboxLimits, Option<String>)>>,
        outcome: Option<CodeExecutionResult>,
    }

    #[async_trait]
    impl CodeSandbox for EchoSandbox {
        async fn execute(
            &self,
            source: &str,
            _language: &str,
            limits: &SandboxLimits,
            stdin: Option<&str>,
        ) -> Result<CodeExecutionResult> {
            self.seen
                .lock()
                .push((source.to_string(), *limits, stdin.map(str::to_string)));
            Ok(self.outcome.clone().unwrap_or(CodeExecutionResult {
                success: true,
                output: source.to_string(),
                exit_code: Some(0),
                ..Default::default()
            }))
        }

        fn languages(&self) -> Vec<String> {
            vec!["python".into()]
        }
    }

    #[tokio::test]
    async fn test_resolves_source_and_parses_json_output() {
        let sandbox = Arc::new(EchoSandbox::default());
        let handler = CodeBlockHandler::new(sandbox.clone(), SandboxLimits::default());
        let input = test_input(
            NodeType::CodeBlock,
            json!({"language": "python", "code": "{\"total\": {{ data.n }}}", "timeout": 250, "stdin": "{{ input.name }}"}),
            json!({"input": {"n": 4, "name": "ada"}}),
            None,
        );

        let out = handler.handle(input).await.unwrap();
        assert_eq!(out["result"], json!({"total": 4}));
        assert_eq!(out["transformation_type"], "code_block");
        assert_eq!(out["execution"]["exitCode"], 0);

        let seen = sandbox.seen.lock();
        assert_eq!(seen[0].1.timeout_ms, 250);
        assert_eq!(seen[0].2.as_deref(), Some("ada"));
    }

    #[tokio::test]
    async fn test_strict_placeholders_and_failures() {
        let handler = CodeBlockHandler::new(Arc::new(EchoSandbox::default()), SandboxLimits::default());
        let unresolved = test_input(NodeType::CodeBlock, json!({"language": "sh", "code": "echo {{ input.nope }}"}), json!({"input": {}}), None);
        assert!(matches!(handler.handle(unresolved).await.unwrap_err(), EngineError::Evaluation(_)));

        let timed_out = EchoSandbox {
            outcome: Some(CodeExecutionResult {
                timed_out: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let handler = CodeBlockHandler::new(Arc::new(timed_out), SandboxLimits::default());
        let input = test_input(NodeType::CodeBlock, json!({"language": "sh", "code": "sleep 9"}), json!({}), None);
        assert!(matches!(handler.handle(input).await.unwrap_err(), EngineError::SandboxTimeout(1000)));

        let crashed = EchoSandbox {
            outcome: Some(CodeExecutionResult {
                exit_code: Some(1),
                error: Some("Traceback".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let handler = CodeBlockHandler::new(Arc::new(crashed), SandboxLimits::default());
        let input = test_input(NodeType::CodeBlock, json!({"language": "python", "code": "raise"}), json!({}), None);
        let err = handler.handle(input).await.unwrap_err();
        assert!(err.to_string().contains("Traceback"));
    }

    #[tokio::test]
    async fn test_runs_in_process_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let handler = CodeBlockHandler::new(Arc::new(ProcessSandbox::new(dir.path())), SandboxLimits::default());
        let input = test_input(
            NodeType::CodeBlock,
            json!({"language": "sh", "code": "echo '[{{ data.a }}, 2]'"}),
            json!({"input": {"a": 1}}),
            None,
        );
        let out = handler.handle(input).await.unwrap();
        assert_eq!(out["result"], json!([1, 2]));
    }
}

//! Built-in handler registration
//!
//! Hosts call [`builtin_registry`] at startup to get a registry covering
//! every leaf node type. Collaborators (sandbox, mailer, database, rule
//! evaluator) are built from the [`EngineConfig`] and can be swapped before
//! registering via [`Builtins`].
//!
//! # Example
//!
//! ```ignore
//! let config = EngineConfig::load("switchyard.json").await?;
//! let registry = switchyard_nodes::builtin_registry(&config)?;
//! let engine = Engine::in_memory(registry, config);
//! ```

use std::sync::Arc;

use switchyard_engine::{CodeSandbox, EngineConfig, HandlerRegistry, NodeType, Result};

use crate::action::{
    http_client, mailer_from_config, Database, EmailHandler, HttpRequestHandler,
    InMemoryDatabase, Mailer, UpdateDatabaseHandler,
};
use crate::code::{CodeBlockHandler, ProcessSandbox};
use crate::rules::{evaluator_from_config, RuleEvaluator, RuleExecutorHandler};
use crate::transform::TransformHandler;

/// Collaborators used by the built-in handlers
pub struct Builtins {
    pub client: reqwest::Client,
    pub sandbox: Arc<dyn CodeSandbox>,
    pub mailer: Arc<dyn Mailer>,
    pub database: Arc<dyn Database>,
    pub rules: Arc<dyn RuleEvaluator>,
}

impl Builtins {
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let client = http_client(&config.http)?;
        let sandbox: Arc<dyn CodeSandbox> = match &config.sandbox.work_dir {
            Some(dir) => Arc::new(ProcessSandbox::new(dir)),
            None => Arc::new(ProcessSandbox::in_temp_dir()),
        };
        Ok(Self {
            mailer: mailer_from_config(client.clone(), &config.email),
            rules: evaluator_from_config(client.clone(), &config.rule_engine),
            database: Arc::new(InMemoryDatabase::new()),
            sandbox,
            client,
        })
    }

    pub fn with_database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = database;
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_rules(mut self, rules: Arc<dyn RuleEvaluator>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn CodeSandbox>) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Register every built-in handler into `registry`
    pub fn register(self, registry: &mut HandlerRegistry, config: &EngineConfig) -> Result<()> {
        registry.register(NodeType::SendHttpRequest, Arc::new(HttpRequestHandler::new(self.client)))?;
        registry.register(
            NodeType::SendEmail,
            Arc::new(EmailHandler::new(self.mailer, config.email.default_from.clone())),
        )?;
        registry.register(NodeType::UpdateDatabase, Arc::new(UpdateDatabaseHandler::new(self.database)))?;
        registry.register(NodeType::RuleExecutor, Arc::new(RuleExecutorHandler::new(self.rules)))?;
        registry.register(
            NodeType::CodeBlock,
            Arc::new(CodeBlockHandler::new(self.sandbox, config.sandbox.limits)),
        )?;
        for node_type in TransformHandler::node_types() {
            registry.register(node_type, Arc::new(TransformHandler::new(node_type)?))?;
        }
        log::debug!("Registered {} built-in node handlers", registry.node_types().len());
        Ok(())
    }
}

/// Register the built-in handlers configured from `config`
pub fn register_builtin_handlers(registry: &mut HandlerRegistry, config: &EngineConfig) -> Result<()> {
    Builtins::from_config(config)?.register(registry, config)
}

/// A registry holding every built-in handler
pub fn builtin_registry(config: &EngineConfig) -> Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    register_builtin_handlers(&mut registry, config)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchyard_engine::{EdgeCondition, Engine, ExecutionStatus, GraphStore, WorkflowBuilder};

    #[test]
    fn test_builtin_registry_covers_every_leaf_type() {
        let registry = builtin_registry(&EngineConfig::default()).unwrap();
        assert!(registry.missing().is_empty(), "{:?}", registry.missing());
        assert!(!registry.has_handler(NodeType::Loop));
    }

    #[tokio::test]
    async fn test_transform_pipeline_end_to_end() {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = EngineConfig::default();
        let database = Arc::new(InMemoryDatabase::new());
        let mut registry = HandlerRegistry::new();
        Builtins::from_config(&config)
            .unwrap()
            .with_database(database.clone())
            .register(&mut registry, &config)
            .unwrap();

        let workflow = WorkflowBuilder::new("orders", "Order totals")
            .node("paid", NodeType::Filter, json!({"source": "$.input.orders", "condition": "item.status == 'paid'"}))
            .node(
                "total",
                NodeType::Aggregate,
                json!({"operations": [{"field": "amount", "type": "sum", "target": "total"}]}),
            )
            .node(
                "save",
                NodeType::UpdateDatabase,
                json!({"table": "totals", "data": {"total": "{{ $.output.total.result.total }}"}}),
            )
            .edge("paid", "total", EdgeCondition::None)
            .edge("total", "save", EdgeCondition::None)
            .build()
            .unwrap();

        let engine = Engine::in_memory(registry, config);
        engine.graph().insert_workflow(workflow).await.unwrap();
        let report = engine
            .trigger(
                "orders",
                Some("manual"),
                json!({"orders": [
                    {"amount": 10, "status": "paid"},
                    {"amount": 99, "status": "open"},
                    {"amount": 5, "status": "paid"},
                ]}),
            )
            .await
            .unwrap();

        assert_eq!(report.status, ExecutionStatus::Completed, "{:?}", report.error);
        assert_eq!(database.rows("totals"), vec![json!({"total": 15})]);
    }
}

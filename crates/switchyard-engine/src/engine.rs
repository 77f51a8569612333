//! Engine facade
//!
//! Bundles the stores, the handler registry, configuration and the event
//! sink behind a single `trigger` entry point.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::{EventSink, NullEventSink};
use crate::executor::WorkflowExecutor;
use crate::registry::HandlerRegistry;
use crate::store::{ExecutionStore, GraphStore, InMemoryExecutionStore, InMemoryGraphStore};
use crate::types::{ExecutionId, ExecutionStatus, WorkflowId};

/// Final state of one triggered execution
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: ExecutionStatus,
    /// Last persisted context snapshot
    pub context: Value,
    pub error: Option<String>,
    /// Snake_case kind of `error`
    pub error_kind: Option<String>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

pub struct Engine {
    graph: Arc<dyn GraphStore>,
    executions: Arc<dyn ExecutionStore>,
    registry: Arc<HandlerRegistry>,
    config: Arc<EngineConfig>,
    events: Arc<dyn EventSink>,
}

impl Engine {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        executions: Arc<dyn ExecutionStore>,
        registry: HandlerRegistry,
        config: EngineConfig,
    ) -> Self {
        let missing = registry.missing();
        if !missing.is_empty() {
            log::debug!("No handlers registered for: {:?}", missing);
        }
        Self {
            graph,
            executions,
            registry: Arc::new(registry),
            config: Arc::new(config),
            events: Arc::new(NullEventSink),
        }
    }

    /// Engine backed by fresh in-memory stores
    pub fn in_memory(registry: HandlerRegistry, config: EngineConfig) -> Self {
        Self::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(InMemoryExecutionStore::new()),
            registry,
            config,
        )
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn graph(&self) -> &dyn GraphStore {
        self.graph.as_ref()
    }

    pub fn executions(&self) -> &dyn ExecutionStore {
        self.executions.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn executor(&self) -> WorkflowExecutor {
        WorkflowExecutor::new(
            self.graph.clone(),
            self.executions.clone(),
            self.registry.clone(),
            self.config.execution.clone(),
        )
        .with_event_sink(self.events.clone())
    }

    /// Create a `running` execution for `workflow_id` and run it to the end.
    ///
    /// Run failures are reported in the returned [`ExecutionReport`]; `Err`
    /// means the execution record itself could not be created or read.
    pub async fn trigger(
        &self,
        workflow_id: &str,
        trigger_id: Option<&str>,
        input: Value,
    ) -> Result<ExecutionReport> {
        let execution = self
            .executions
            .create_execution(workflow_id, trigger_id, Value::Null)
            .await?;
        log::info!(
            "Triggered workflow '{}' as execution '{}'{}",
            workflow_id,
            execution.id,
            trigger_id.map(|t| format!(" by '{}'", t)).unwrap_or_default()
        );

        let outcome = self.executor().run(workflow_id, &execution.id, input).await;
        let stored = self.executions.get_execution(&execution.id).await?;
        let context = stored.map(|e| e.context).unwrap_or(Value::Null);

        Ok(match outcome {
            Ok(_) => ExecutionReport {
                execution_id: execution.id,
                workflow_id: workflow_id.to_string(),
                status: ExecutionStatus::Completed,
                context,
                error: None,
                error_kind: None,
            },
            Err(err) => ExecutionReport {
                execution_id: execution.id,
                workflow_id: workflow_id.to_string(),
                status: ExecutionStatus::Failed,
                context,
                error: Some(err.to_string()),
                error_kind: Some(err.kind().to_string()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;
    use crate::error::EngineError;
    use crate::events::{VecEventSink, WorkflowEvent};
    use crate::types::{EdgeCondition, NodeType};
    use serde_json::json;

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry
            .register_callback(NodeType::Map, |input| async move { input.resolved_config(true) })
            .unwrap();
        registry
            .register_callback(NodeType::SendHttpRequest, |_| async {
                Err(EngineError::handler("503 Service Unavailable"))
            })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_trigger_reports_success() {
        let events = Arc::new(VecEventSink::new());
        let engine = Engine::in_memory(registry(), EngineConfig::default()).with_event_sink(events.clone());
        let workflow = WorkflowBuilder::new("wf", "Greeting")
            .node("greet", NodeType::Map, json!({"message": "hello {{ user }}"}))
            .build()
            .unwrap();
        engine.graph().insert_workflow(workflow).await.unwrap();

        let report = engine.trigger("wf", Some("webhook"), json!({"user": "ada"})).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.context["output"]["greet"]["message"], "hello ada");
        assert!(report.error.is_none());

        let execution = engine.executions().get_execution(&report.execution_id).await.unwrap().unwrap();
        assert_eq!(execution.trigger_id.as_deref(), Some("webhook"));
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, WorkflowEvent::NodeCompleted { node_id, .. } if node_id == "greet")));
    }

    #[tokio::test]
    async fn test_trigger_reports_failure_without_propagating() {
        let engine = Engine::in_memory(registry(), EngineConfig::default());
        let workflow = WorkflowBuilder::new("wf", "Failing")
            .node("prep", NodeType::Map, json!({"ok": true}))
            .node("call", NodeType::SendHttpRequest, json!({}))
            .edge("prep", "call", EdgeCondition::None)
            .build()
            .unwrap();
        engine.graph().insert_workflow(workflow).await.unwrap();

        let report = engine.trigger("wf", None, json!({})).await.unwrap();
        assert_eq!(report.status, ExecutionStatus::Failed);
        assert_eq!(report.error_kind.as_deref(), Some("handler_error"));
        assert_eq!(report.context["output"]["prep"]["ok"], true);
        assert_eq!(report.context["output"]["call"]["status"], "failed");

        let missing = engine.trigger("ghost", None, json!({})).await.unwrap();
        assert_eq!(missing.error_kind.as_deref(), Some("workflow_not_found"));
    }
}

//! Workflow executor
//!
//! Walks a workflow from its entry node one step at a time, persisting the
//! execution after every step. The first failed node ends the run.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::config::ExecutionSettings;
use crate::context::{ExecutionState, Scope};
use crate::error::{EngineError, Result};
use crate::events::{emit, EventSink, NullEventSink, WorkflowEvent};
use crate::registry::HandlerRegistry;
use crate::runner::NodeRunner;
use crate::store::{ExecutionStore, GraphStore};
use crate::types::{ExecutionStatus, Node, NodeId};

/// Runs whole workflows against a graph store
#[derive(Clone)]
pub struct WorkflowExecutor {
    graph: Arc<dyn GraphStore>,
    executions: Arc<dyn ExecutionStore>,
    registry: Arc<HandlerRegistry>,
    settings: ExecutionSettings,
    events: Arc<dyn EventSink>,
}

impl WorkflowExecutor {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        executions: Arc<dyn ExecutionStore>,
        registry: Arc<HandlerRegistry>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            graph,
            executions,
            registry,
            settings,
            events: Arc::new(NullEventSink),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Run `workflow_id` under an execution record that already exists.
    ///
    /// On failure the execution is marked `failed` with the last-known
    /// context snapshot and the node's error is returned.
    pub async fn run(&self, workflow_id: &str, execution_id: &str, input: Value) -> Result<ExecutionState> {
        let mut state = ExecutionState::new(input);

        let workflow = match self.graph.get_workflow(workflow_id).await {
            Ok(Some(workflow)) => workflow,
            Ok(None) => {
                let err = EngineError::WorkflowNotFound(workflow_id.to_string());
                return Err(self.fail(workflow_id, execution_id, &state, err).await);
            }
            Err(err) => return Err(self.fail(workflow_id, execution_id, &state, err).await),
        };
        if !workflow.enabled {
            let err = EngineError::WorkflowDisabled(workflow_id.to_string());
            return Err(self.fail(workflow_id, execution_id, &state, err).await);
        }

        log::info!("Executing workflow '{}' ({})", workflow.name, execution_id);
        emit(
            self.events.as_ref(),
            WorkflowEvent::ExecutionStarted {
                workflow_id: workflow_id.to_string(),
                execution_id: execution_id.to_string(),
            },
        );

        let mut current = match self.graph.entry_node(workflow_id).await {
            Ok(entry) => entry,
            Err(err) => return Err(self.fail(workflow_id, execution_id, &state, err).await),
        };

        let runner = NodeRunner::new(
            self.graph.as_ref(),
            self.executions.as_ref(),
            self.registry.as_ref(),
            &self.settings,
            self.events.as_ref(),
        );
        let mut prev: Option<NodeId> = None;
        let mut steps = 0usize;

        while let Some(node) = current.take() {
            let outcome = match runner
                .run_node(execution_id, &node, &mut state, prev.as_deref(), &Scope::TopLevel)
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => return Err(self.fail(workflow_id, execution_id, &state, err).await),
            };
            let next = match outcome.into_result() {
                Ok((_, next)) => next,
                Err(err) => return Err(self.fail(workflow_id, execution_id, &state, err).await),
            };
            steps += 1;

            self.executions
                .update_execution(execution_id, ExecutionStatus::Completed, state.snapshot(), Some(Utc::now()))
                .await?;

            prev = Some(node.id);
            current = match next {
                Some(next_id) => match self.load_node(&next_id).await {
                    Ok(node) => Some(node),
                    Err(err) => return Err(self.fail(workflow_id, execution_id, &state, err).await),
                },
                None => None,
            };
        }

        self.executions
            .update_execution(execution_id, ExecutionStatus::Completed, state.snapshot(), Some(Utc::now()))
            .await?;
        emit(
            self.events.as_ref(),
            WorkflowEvent::ExecutionCompleted {
                workflow_id: workflow_id.to_string(),
                execution_id: execution_id.to_string(),
            },
        );
        log::info!(
            "Workflow '{}' completed after {} steps ({})",
            workflow_id,
            steps,
            execution_id
        );
        Ok(state)
    }

    async fn load_node(&self, node_id: &str) -> Result<Node> {
        self.graph
            .get_node(node_id)
            .await?
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))
    }

    /// Record a terminal failure and hand the error back
    async fn fail(
        &self,
        workflow_id: &str,
        execution_id: &str,
        state: &ExecutionState,
        err: EngineError,
    ) -> EngineError {
        log::error!("Workflow '{}' failed ({}): {}", workflow_id, execution_id, err);
        if let Err(store_err) = self
            .executions
            .update_execution(execution_id, ExecutionStatus::Failed, state.snapshot(), Some(Utc::now()))
            .await
        {
            log::error!("Could not mark execution '{}' failed: {}", execution_id, store_err);
        }
        emit(
            self.events.as_ref(),
            WorkflowEvent::ExecutionFailed {
                workflow_id: workflow_id.to_string(),
                execution_id: execution_id.to_string(),
                error: err.to_string(),
            },
        );
        err
    }
}

//! Node runner
//!
//! Runs exactly one node step: audit log, dispatch by node type, result
//! storage in the scope's region, then the next node by the type's edge
//! policy. A failing node never escapes as `Err`; it comes back as a
//! [`NodeOutcome`] carrying the error, and `Err` is reserved for the
//! bookkeeping itself (store writes) failing.

use chrono::Utc;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use crate::config::ExecutionSettings;
use crate::constants::context_keys;
use crate::context::{ExecutionState, Scope};
use crate::control::{conditional, loops, switch};
use crate::edges::EdgeResolver;
use crate::error::{EngineError, Result};
use crate::events::{emit, EventSink, WorkflowEvent};
use crate::node_config::{edge_policy, EdgePolicy, NodeKind};
use crate::registry::{HandlerInput, HandlerRegistry};
use crate::retry::RetryPolicy;
use crate::store::{ExecutionStore, GraphStore, NodeLogEntry};
use crate::types::{EdgeCondition, ExecutionStatus, LogEvent, Node, NodeId};

/// What a single node step produced
#[derive(Debug)]
pub struct NodeOutcome {
    /// The value stored for the node (a failure record when `error` is set)
    pub result: Value,
    pub next: Option<NodeId>,
    pub error: Option<EngineError>,
}

impl NodeOutcome {
    pub fn status(&self) -> ExecutionStatus {
        if self.error.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        }
    }

    /// Turn a failed step into an error for callers that abort on failure
    pub fn into_result(self) -> Result<(Value, Option<NodeId>)> {
        match self.error {
            Some(err) => Err(err),
            None => Ok((self.result, self.next)),
        }
    }
}

/// Dispatch result before edge resolution
struct Step {
    result: Value,
    /// Outcome for branching nodes
    passed: Option<bool>,
    /// Chosen target for switch nodes
    selected: Option<NodeId>,
}

impl Step {
    fn plain(result: Value) -> Self {
        Self {
            result,
            passed: None,
            selected: None,
        }
    }
}

/// Borrowed services needed to run nodes of one execution
pub struct NodeRunner<'a> {
    pub(crate) graph: &'a dyn GraphStore,
    executions: &'a dyn ExecutionStore,
    registry: &'a HandlerRegistry,
    pub(crate) settings: &'a ExecutionSettings,
    pub(crate) events: &'a dyn EventSink,
}

impl<'a> NodeRunner<'a> {
    pub fn new(
        graph: &'a dyn GraphStore,
        executions: &'a dyn ExecutionStore,
        registry: &'a HandlerRegistry,
        settings: &'a ExecutionSettings,
        events: &'a dyn EventSink,
    ) -> Self {
        Self {
            graph,
            executions,
            registry,
            settings,
            events,
        }
    }

    pub(crate) fn resolver(&self) -> EdgeResolver<'a> {
        EdgeResolver::new(self.graph)
    }

    /// Run one node in `scope`.
    ///
    /// Boxed because loop nodes run their body through this same method.
    pub fn run_node<'b>(
        &'b self,
        execution_id: &'b str,
        node: &'b Node,
        state: &'b mut ExecutionState,
        prev: Option<&'b str>,
        scope: &'b Scope,
    ) -> BoxFuture<'b, Result<NodeOutcome>> {
        Box::pin(async move {
            log::debug!(
                "Running {} node '{}'{}",
                node.node_type,
                node.id,
                scope
                    .iteration()
                    .map(|i| format!(" (iteration {})", i))
                    .unwrap_or_default()
            );
            let log_id = self
                .executions
                .log_node_execution(NodeLogEntry::new(execution_id, &node.id, LogEvent::Start, None))
                .await?;
            emit(
                self.events,
                WorkflowEvent::node_started(&node.id, execution_id, node.node_type.as_str()),
            );

            let step = match self.dispatch(execution_id, node, state, prev, scope).await {
                Ok(step) => {
                    state.record(&node.id, scope, step.result.clone());
                    self.resolve_next(node, &step, scope).await.map(|next| (step.result, next))
                }
                Err(e) => Err(e),
            };

            match step {
                Ok((result, next)) => {
                    self.executions
                        .update_node_execution_log(&log_id, LogEvent::Success, Some(Utc::now()), Some(result.clone()))
                        .await?;
                    emit(
                        self.events,
                        WorkflowEvent::NodeCompleted {
                            node_id: node.id.clone(),
                            execution_id: execution_id.to_string(),
                            output: result.clone(),
                        },
                    );
                    log::debug!("Node '{}' completed, next {:?}", node.id, next);
                    Ok(NodeOutcome {
                        result,
                        next,
                        error: None,
                    })
                }
                Err(err) => {
                    let message = err.to_string();
                    log::error!("Node '{}' failed: {}", node.id, message);
                    let failed = json!({"status": "failed", "error": message});
                    state.record(&node.id, scope, failed.clone());
                    self.executions
                        .update_node_execution_log(
                            &log_id,
                            LogEvent::Failure,
                            Some(Utc::now()),
                            Some(json!({"error": message, "kind": err.kind()})),
                        )
                        .await?;
                    emit(self.events, WorkflowEvent::node_failed(&node.id, execution_id, message));
                    Ok(NodeOutcome {
                        result: failed,
                        next: None,
                        error: Some(err),
                    })
                }
            }
        })
    }

    async fn dispatch(
        &self,
        execution_id: &str,
        node: &Node,
        state: &mut ExecutionState,
        prev: Option<&str>,
        scope: &Scope,
    ) -> Result<Step> {
        match NodeKind::from_node(node, self.settings)? {
            NodeKind::Conditional(config) => {
                let outcome = conditional::evaluate(&config, &state.view())?;
                Ok(Step {
                    passed: Some(outcome.success),
                    ..Step::plain(serde_json::to_value(&outcome)?)
                })
            }
            NodeKind::Switch(_) => {
                let edges = self.resolver().switch_edges(&node.id).await?;
                let outcome = switch::select_case(&node.id, &edges, &state.view())?;
                Ok(Step {
                    selected: Some(outcome.next.clone()),
                    ..Step::plain(outcome.to_output()?)
                })
            }
            NodeKind::Loop(strategy) => {
                let result = loops::run_loop(self, execution_id, node, &strategy, state).await?;
                Ok(Step::plain(result))
            }
            NodeKind::Action(policy) => {
                let result = self.run_action(execution_id, node, policy, state, prev, scope).await?;
                Ok(Step::plain(result))
            }
            NodeKind::Rule => {
                let result = self.call_handler(execution_id, node, state, prev, scope).await?;
                let passed = result
                    .get("rule_evaluation_result")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| {
                        EngineError::handler(format!(
                            "rule executor '{}' returned no boolean rule_evaluation_result",
                            node.id
                        ))
                    })?;
                Ok(Step {
                    passed: Some(passed),
                    ..Step::plain(result)
                })
            }
            NodeKind::Transform => {
                let result = self.call_handler(execution_id, node, state, prev, scope).await?;
                Ok(Step::plain(result))
            }
        }
    }

    async fn resolve_next(&self, node: &Node, step: &Step, scope: &Scope) -> Result<Option<NodeId>> {
        let resolver = self.resolver();
        match edge_policy(node.node_type) {
            EdgePolicy::Branch => {
                let passed = step
                    .passed
                    .ok_or_else(|| EngineError::handler(format!("node '{}' produced no branch outcome", node.id)))?;
                resolver.branch(&node.id, passed, scope.group_id()).await
            }
            EdgePolicy::Case => Ok(step.selected.clone()),
            EdgePolicy::LoopExit => resolver.after_loop(&node.id).await,
            EdgePolicy::Sequential => {
                resolver.next(&node.id, &EdgeCondition::None, scope.group_id()).await
            }
        }
    }

    /// Invoke an action handler, retrying per `policy`
    async fn run_action(
        &self,
        execution_id: &str,
        node: &Node,
        policy: RetryPolicy,
        state: &ExecutionState,
        prev: Option<&str>,
        scope: &Scope,
    ) -> Result<Value> {
        let mut attempt: u32 = 1;
        loop {
            match self.call_handler(execution_id, node, state, prev, scope).await {
                Ok(result) => {
                    return Ok(json!({
                        "name": node.name,
                        "result": result,
                        "retry_attempts": attempt - 1,
                    }));
                }
                Err(err) if policy.should_retry(attempt) => {
                    log::warn!(
                        "Node '{}' attempt {}/{} failed: {}; retrying in {} ms",
                        node.id,
                        attempt,
                        policy.max_attempts(),
                        err,
                        policy.delay_ms
                    );
                    self.executions
                        .log_node_execution(NodeLogEntry::new(
                            execution_id,
                            &node.id,
                            LogEvent::Retry,
                            Some(json!({"attempt": attempt, "error": err.to_string()})),
                        ))
                        .await?;
                    emit(
                        self.events,
                        WorkflowEvent::NodeRetrying {
                            node_id: node.id.clone(),
                            execution_id: execution_id.to_string(),
                            attempt,
                            delay_ms: policy.delay_ms,
                            error: err.to_string(),
                        },
                    );
                    tokio::time::sleep(policy.delay()).await;
                    attempt += 1;
                }
                Err(err) => return Err(policy.exhausted(attempt, err)),
            }
        }
    }

    async fn call_handler(
        &self,
        execution_id: &str,
        node: &Node,
        state: &ExecutionState,
        prev: Option<&str>,
        scope: &Scope,
    ) -> Result<Value> {
        let handler = self.registry.get(node.node_type).ok_or_else(|| {
            EngineError::config(format!("no handler registered for node type '{}'", node.node_type))
        })?;

        let previous_output = prev.and_then(|p| state.result_in_scope(p, scope)).cloned();
        let mut context = state.view();
        if let Value::Object(map) = &mut context {
            map.insert(
                context_keys::PREVIOUS.to_string(),
                previous_output.clone().unwrap_or(Value::Null),
            );
        }

        handler
            .handle(HandlerInput {
                node: node.clone(),
                context,
                previous_output,
                group_id: scope.group_id().map(str::to_string),
                execution_id: execution_id.to_string(),
            })
            .await
    }
}


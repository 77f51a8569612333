//! Loop controller and subgraph executor
//!
//! A loop node runs its body once per pass. The body starts at the target
//! of the loop's subgraph-entry edge and follows edges scoped to the loop
//! until it reaches a node with no next node or wraps back to the loop.

use serde_json::{json, Value};

use crate::context::{ExecutionState, Scope};
use crate::error::{EngineError, Result};
use crate::events::{emit, WorkflowEvent};
use crate::expression;
use crate::node_config::LoopStrategy;
use crate::runner::NodeRunner;
use crate::template::{lookup_path, resolve_expression_source, resolve_str};
use crate::types::{Node, NodeId};

/// What happened to one pass
#[derive(Debug, PartialEq, Eq)]
enum Pass {
    Ran,
    /// No subgraph-entry edge, the loop stops early
    NoBody,
    /// The entry edge points back at the loop itself
    SelfPointing,
}

/// Run a loop node to completion and return its output
pub(crate) async fn run_loop(
    runner: &NodeRunner<'_>,
    execution_id: &str,
    node: &Node,
    strategy: &LoopStrategy,
    state: &mut ExecutionState,
) -> Result<Value> {
    state.enter_loop(&node.id);
    let result = drive(runner, execution_id, node, strategy, state).await;
    state.leave_loop(&node.id);

    let iterations = result?;
    log::debug!("Loop '{}' ran {} iterations", node.id, iterations);
    Ok(json!({
        "loop_type": strategy.loop_type().as_str(),
        "iterations": iterations,
    }))
}

async fn drive(
    runner: &NodeRunner<'_>,
    execution_id: &str,
    node: &Node,
    strategy: &LoopStrategy,
    state: &mut ExecutionState,
) -> Result<usize> {
    let mut completed = 0;
    match strategy {
        LoopStrategy::FixedCount { iterations } => {
            for i in 0..*iterations as usize {
                state.set_cursor(i, None);
                match pass(runner, execution_id, node, i, state).await? {
                    Pass::Ran => completed += 1,
                    Pass::NoBody => break,
                    Pass::SelfPointing => continue,
                }
            }
        }
        LoopStrategy::ForEach { data_source_path } => {
            let items = resolve_items(data_source_path, &state.view())?;
            for (i, item) in items.into_iter().enumerate() {
                state.set_cursor(i, Some(item));
                match pass(runner, execution_id, node, i, state).await? {
                    Pass::Ran => completed += 1,
                    Pass::NoBody => break,
                    Pass::SelfPointing => continue,
                }
            }
        }
        LoopStrategy::WhileLoop {
            exit_condition,
            max_iterations,
        } => {
            let cap = max_iterations.or(runner.settings.max_while_iterations);
            let mut i = 0usize;
            loop {
                if cap.is_some_and(|max| i >= max as usize) {
                    log::debug!("Loop '{}' reached its iteration cap", node.id);
                    break;
                }
                state.set_cursor(i, None);
                if exit_reached(exit_condition, &state.view())? {
                    break;
                }
                match pass(runner, execution_id, node, i, state).await? {
                    Pass::Ran => completed += 1,
                    Pass::NoBody => break,
                    // nothing can change the exit condition
                    Pass::SelfPointing => break,
                }
                i += 1;
            }
        }
    }
    Ok(completed)
}

/// Resolve the body entry and run it for iteration `i`
async fn pass(
    runner: &NodeRunner<'_>,
    execution_id: &str,
    node: &Node,
    iteration: usize,
    state: &mut ExecutionState,
) -> Result<Pass> {
    let Some(entry) = runner.resolver().subgraph_entry(&node.id).await? else {
        log::debug!("Loop '{}' has no body, stopping", node.id);
        return Ok(Pass::NoBody);
    };
    if entry == node.id {
        log::warn!("Loop '{}' body points back at the loop, skipping iteration {}", node.id, iteration);
        return Ok(Pass::SelfPointing);
    }
    emit(runner.events, WorkflowEvent::loop_iteration(&node.id, execution_id, iteration));
    run_subgraph(runner, execution_id, &node.id, entry, iteration, state).await?;
    Ok(Pass::Ran)
}

/// Run the body of loop `loop_id` for one iteration, starting at `entry`.
///
/// Any failed body node aborts the pass with that node's error.
pub(crate) async fn run_subgraph(
    runner: &NodeRunner<'_>,
    execution_id: &str,
    loop_id: &str,
    entry: NodeId,
    iteration: usize,
    state: &mut ExecutionState,
) -> Result<()> {
    let scope = Scope::group(loop_id, iteration);
    let mut current = Some(entry);
    // the loop has no output yet, so the entry sees no previous result
    let mut prev: Option<NodeId> = None;

    while let Some(node_id) = current.take() {
        if node_id == loop_id {
            break;
        }
        let node = runner
            .graph
            .get_node(&node_id)
            .await?
            .ok_or_else(|| EngineError::NodeNotFound(node_id.clone()))?;
        let outcome = runner
            .run_node(execution_id, &node, state, prev.as_deref(), &scope)
            .await?;
        let (_, next) = outcome.into_result()?;
        prev = Some(node.id);
        current = next;
    }
    Ok(())
}

fn resolve_items(path: &str, context: &Value) -> Result<Vec<Value>> {
    let value = if path.contains("{{") {
        resolve_str(path, context, true)?
    } else {
        lookup_path(context, path)
            .cloned()
            .ok_or_else(|| EngineError::evaluation(format!("data_source_path '{}' did not resolve", path)))?
    };
    match value {
        Value::Array(items) => Ok(items),
        other => Err(EngineError::evaluation(format!(
            "data_source_path '{}' resolved to {}, expected an array",
            path,
            expression::type_name(&other)
        ))),
    }
}

fn exit_reached(exit_condition: &str, context: &Value) -> Result<bool> {
    let source = resolve_expression_source(exit_condition, context)?;
    Ok(expression::evaluate(&source, context)?.matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_items() {
        let context = json!({"input": {"items": [1, 2, 3], "name": "x"}});
        assert_eq!(resolve_items("$.input.items", &context).unwrap().len(), 3);
        assert_eq!(resolve_items("{{ $.input.items }}", &context).unwrap().len(), 3);
        assert!(matches!(
            resolve_items("$.input.name", &context).unwrap_err(),
            EngineError::Evaluation(_)
        ));
        assert!(resolve_items("$.input.missing", &context).is_err());
    }

    #[test]
    fn test_exit_condition() {
        let context = json!({"$index": 3});
        assert!(exit_reached("$index >= 3", &context).unwrap());
        assert!(!exit_reached("{{ $index }} > 3", &context).unwrap());
    }
}

//! Switch node case selection

use serde::Serialize;
use serde_json::Value;

use super::ExpressionOutcome;
use crate::error::{EngineError, Result};
use crate::expression;
use crate::template::resolve_expression_source;
use crate::types::{Edge, EdgeCondition, EdgeId, NodeId};

/// Result of evaluating a switch node's outgoing edges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchOutcome {
    /// Label of the chosen edge (`case_<n>` or `none` for the fallback)
    pub matched_case: String,
    pub matched_case_id: EdgeId,
    pub evaluations: Vec<ExpressionOutcome>,
    #[serde(skip)]
    pub next: NodeId,
}

impl SwitchOutcome {
    pub fn to_output(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Pick the outgoing edge of switch node `node_id`.
///
/// `edges` must be ordered by condition ascending. A `none` edge is kept as
/// the fallback while the case edges are evaluated; the first case whose
/// expression is truthy wins.
pub fn select_case(node_id: &str, edges: &[Edge], context: &Value) -> Result<SwitchOutcome> {
    let mut fallback: Option<&Edge> = None;
    let mut evaluations = Vec::new();

    for edge in edges {
        if edge.condition == EdgeCondition::None {
            fallback = fallback.or(Some(edge));
            continue;
        }
        let raw = edge
            .expression
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                EngineError::config(format!("switch edge '{}' has no case expression", edge.id))
            })?;
        let source = resolve_expression_source(raw, context)?;
        let evaluation = expression::evaluate(&source, context)?;
        let matched = evaluation.matched;
        evaluations.push(ExpressionOutcome {
            expression: source,
            success: matched,
            matched_value: evaluation.value,
        });
        if matched {
            log::debug!("Switch '{}' matched {} via edge '{}'", node_id, edge.condition, edge.id);
            return Ok(outcome(edge, evaluations));
        }
    }

    match fallback {
        Some(edge) => {
            log::debug!("Switch '{}' fell back to edge '{}'", node_id, edge.id);
            Ok(outcome(edge, evaluations))
        }
        None => Err(EngineError::NoMatchingCase(node_id.to_string())),
    }
}

fn outcome(edge: &Edge, evaluations: Vec<ExpressionOutcome>) -> SwitchOutcome {
    SwitchOutcome {
        matched_case: edge.condition.label(),
        matched_case_id: edge.id.clone(),
        evaluations,
        next: edge.target.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case(id: &str, n: u32, target: &str, expression: &str) -> Edge {
        Edge::new(id, "wf", "sw", target, EdgeCondition::Case(n)).with_expression(expression)
    }

    #[test]
    fn test_second_case_matches_before_fallback() {
        let edges = vec![
            case("e1", 1, "a", "{{ $.input.x }} > 10"),
            case("e2", 2, "b", "{{ $.input.x }} > 1"),
            Edge::new("e3", "wf", "sw", "c", EdgeCondition::None),
        ];
        let context = json!({"input": {"x": 5}});
        let outcome = select_case("sw", &edges, &context).unwrap();
        assert_eq!(outcome.matched_case, "case_2");
        assert_eq!(outcome.matched_case_id, "e2");
        assert_eq!(outcome.next, "b");
        assert_eq!(outcome.evaluations.len(), 2);
        assert!(!outcome.evaluations[0].success);

        let output = outcome.to_output().unwrap();
        assert_eq!(output["matched_case"], "case_2");
        assert!(output.get("next").is_none());
    }

    #[test]
    fn test_fallback_when_nothing_matches() {
        let edges = vec![
            case("e1", 1, "a", "false"),
            Edge::new("e2", "wf", "sw", "c", EdgeCondition::None),
        ];
        let outcome = select_case("sw", &edges, &json!({})).unwrap();
        assert_eq!(outcome.matched_case, "none");
        assert_eq!(outcome.next, "c");
    }

    #[test]
    fn test_no_match_without_fallback() {
        let edges = vec![case("e1", 1, "a", "1 == 2"), case("e2", 2, "b", "'x' == 'y'")];
        let err = select_case("sw", &edges, &json!({})).unwrap_err();
        assert!(matches!(err, EngineError::NoMatchingCase(ref id) if id == "sw"));

        assert!(matches!(
            select_case("sw", &[], &json!({})).unwrap_err(),
            EngineError::NoMatchingCase(_)
        ));
    }

    #[test]
    fn test_case_expression_error_is_evaluation_error() {
        let edges = vec![case("e1", 1, "a", "1 +")];
        assert!(matches!(
            select_case("sw", &edges, &json!({})).unwrap_err(),
            EngineError::Evaluation(_)
        ));
    }
}

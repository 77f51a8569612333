//! Conditional node evaluation

use serde_json::Value;

use super::ExpressionOutcome;
use crate::error::{EngineError, Result};
use crate::expression;
use crate::node_config::{Condition, ConditionalConfig, LogicalOperator};
use crate::template::resolve_expression_source;

/// Fold ordered conditions into one expression, left to right.
///
/// `[a, (b, ||), c]` becomes `((a) || (b)) && (c)`; a missing operator is `&&`.
pub fn fold_conditions(conditions: &[Condition]) -> Option<String> {
    let (first, rest) = conditions.split_first()?;
    let folded = rest.iter().fold(first.expression.clone(), |acc, condition| {
        let op = condition.operator.unwrap_or(LogicalOperator::And);
        format!("({}) {} ({})", acc, op.as_str(), condition.expression)
    });
    Some(folded)
}

/// Evaluate a conditional node's config against the context view
pub fn evaluate(config: &ConditionalConfig, context: &Value) -> Result<ExpressionOutcome> {
    let folded = fold_conditions(&config.conditions)
        .ok_or_else(|| EngineError::config("conditional node requires at least one condition"))?;
    let source = resolve_expression_source(&folded, context)?;
    let evaluation = expression::evaluate(&source, context)?;
    log::debug!("Condition '{}' -> {}", source, evaluation.matched);
    Ok(ExpressionOutcome {
        expression: source,
        success: evaluation.matched,
        matched_value: evaluation.value,
    })
}

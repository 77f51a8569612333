use serde::Deserialize;
use serde_json::Value;
use switchyard_engine::expression;
use switchyard_engine::template::{resolve_expression_source, set_path};
use switchyard_engine::{EngineError, NodeType, Result};

use crate::data::{map_each, parse_rules, with_data};

#[derive(Debug, Deserialize)]
struct FormulaRules {
    #[serde(alias = "formula")]
    expression: String,
    target: Option<String>,
}

/// Evaluate an expression per item; `data`, `item` and `$item` are in scope.
///
/// With a `target` the value is written into the item, otherwise the value
/// replaces it.
pub fn formula(data: Value, rules: &Value, context: &Value) -> Result<Value> {
    let rules: FormulaRules = parse_rules(NodeType::Formula, rules)?;
    if rules.expression.trim().is_empty() {
        return Err(EngineError::config("formula requires an 'expression'"));
    }
    let whole = data.clone();
    map_each(data, |item| {
        let scope = with_data(context, &whole, Some(&item));
        let source = resolve_expression_source(&rules.expression, &scope)?;
        let value = expression::evaluate(&source, &scope)?.value;
        Ok(match rules.target.as_deref() {
            Some(target) => {
                let mut out = item;
                set_path(&mut out, target, value);
                out
            }
            None => value,
        })
    })
}

//! Shared helpers for reading handler input
//!
//! Transforms and the code block operate on a "source" value: the config's
//! `source` path when given, else the previous node's result, else the
//! trigger input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use switchyard_engine::constants::context_keys;
use switchyard_engine::template::{has_placeholders, lookup_path, resolve_str, resolve_template};
use switchyard_engine::{EngineError, HandlerInput, NodeType, Result};

/// Config value accepted as a single item or a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// The value a transform or code block operates on
pub fn source_data(input: &HandlerInput) -> Result<Value> {
    if let Some(source) = input.config_field("source").and_then(Value::as_str) {
        return if has_placeholders(source) {
            resolve_str(source, &input.context, true)
        } else {
            lookup_path(&input.context, source)
                .cloned()
                .ok_or_else(|| EngineError::config(format!("source '{}' did not resolve", source)))
        };
    }
    if let Some(previous) = &input.previous_output {
        return Ok(unwrap_result(previous));
    }
    Ok(input
        .context
        .get(context_keys::INPUT)
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new())))
}

/// Action and transform results wrap their payload in `result`
fn unwrap_result(previous: &Value) -> Value {
    match previous.get("result") {
        Some(result) => result.clone(),
        None => previous.clone(),
    }
}

/// Node config with placeholders resolved, except `raw_keys` which are kept
/// verbatim for per-item evaluation
pub fn resolved_rules(input: &HandlerInput, raw_keys: &[&str]) -> Result<Value> {
    let mut rules = match &input.node.config {
        Value::Null => Value::Object(Map::new()),
        config => config.clone(),
    };
    let mut kept = Vec::new();
    if let Value::Object(map) = &mut rules {
        for key in raw_keys {
            if let Some(value) = map.remove(*key) {
                kept.push((key.to_string(), value));
            }
        }
    }
    let mut resolved = resolve_template(&rules, &input.context, false)?;
    if let Value::Object(map) = &mut resolved {
        map.extend(kept);
    }
    Ok(resolved)
}

/// Parse resolved rules into a typed config
pub fn parse_rules<T: serde::de::DeserializeOwned>(node_type: NodeType, rules: &Value) -> Result<T> {
    serde_json::from_value(rules.clone())
        .map_err(|e| EngineError::config(format!("invalid {} rules: {}", node_type, e)))
}

/// Context view with `data` (and optionally `item`) added for evaluation
pub fn with_data(context: &Value, data: &Value, item: Option<&Value>) -> Value {
    let mut root = match context {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    root.insert("data".to_string(), data.clone());
    if let Some(item) = item {
        root.insert("item".to_string(), item.clone());
        root.insert(context_keys::ITEM.to_string(), item.clone());
    }
    Value::Object(root)
}

/// Apply `f` to every element of an array, or to the value itself
pub fn map_each<F>(data: Value, mut f: F) -> Result<Value>
where
    F: FnMut(Value) -> Result<Value>,
{
    match data {
        Value::Array(items) => items.into_iter().map(f).collect::<Result<Vec<_>>>().map(Value::Array),
        other => f(other),
    }
}

/// Read a required string field from a resolved config
pub fn required_str<'a>(config: &'a Value, key: &str, node_type: NodeType) -> Result<&'a str> {
    config
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| EngineError::config(format!("{} node requires '{}'", node_type, key)))
}

#[cfg(test)]
pub(crate) fn test_input(node_type: NodeType, config: Value, context: Value, previous: Option<Value>) -> HandlerInput {
    HandlerInput {
        node: switchyard_engine::Node::new("n1", "wf", node_type, config),
        context,
        previous_output: previous,
        group_id: None,
        execution_id: "exec-1".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_data_precedence() {
        let context = json!({"input": {"a": 1}, "output": {"prev": {"b": 2}}});

        let from_input = test_input(NodeType::Map, json!({}), context.clone(), None);
        assert_eq!(source_data(&from_input).unwrap(), json!({"a": 1}));

        let wrapped = Some(json!({"result": [1, 2], "transformation_type": "filter"}));
        let from_previous = test_input(NodeType::Map, json!({}), context.clone(), wrapped);
        assert_eq!(source_data(&from_previous).unwrap(), json!([1, 2]));

        let by_path = test_input(NodeType::Map, json!({"source": "$.output.prev"}), context.clone(), None);
        assert_eq!(source_data(&by_path).unwrap(), json!({"b": 2}));

        let missing = test_input(NodeType::Map, json!({"source": "$.output.nope"}), context, None);
        assert!(source_data(&missing).is_err());
    }

    #[test]
    fn test_resolved_rules_keeps_raw_keys() {
        let input = test_input(
            NodeType::Filter,
            json!({"condition": "{{ item.n }} > 1", "label": "{{ input.a }}"}),
            json!({"input": {"a": "x"}}),
            None,
        );
        let rules = resolved_rules(&input, &["condition"]).unwrap();
        assert_eq!(rules["label"], "x");
        assert_eq!(rules["condition"], "{{ item.n }} > 1");
    }

    #[test]
    fn test_one_or_many() {
        let one: OneOrMany<String> = serde_json::from_value(json!("a")).unwrap();
        let many: OneOrMany<String> = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(one.into_vec(), vec!["a"]);
        assert_eq!(many.into_vec().len(), 2);
    }
}

//! Data transform handlers
//!
//! Every transform reads its source value (see [`crate::data::source_data`]),
//! applies one pure function from the submodules and returns
//! `{result, transformation_type, timestamp}`. Transforms never retry.

mod collection;
mod date;
mod formula;
mod object;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use switchyard_engine::{EngineError, HandlerInput, NodeCategory, NodeHandler, NodeType, Result};

use crate::data::{resolved_rules, source_data};

pub use date::{iso, parse_date};

/// Config keys evaluated per item rather than once up front
const PER_ITEM_KEYS: &[&str] = &["condition", "expression", "formula"];

/// Apply the transform for `node_type` to `data`
pub fn apply(node_type: NodeType, data: Value, rules: &Value, context: &Value) -> Result<Value> {
    match node_type {
        NodeType::Map => object::map(data, rules),
        NodeType::Rename => object::rename(data, rules),
        NodeType::Remove => object::remove(data, rules),
        NodeType::Copy => object::copy(data, rules),
        NodeType::Concat => object::concat(data, rules),
        NodeType::ConvertType => object::convert_type(data, rules),
        NodeType::Split => object::split(data, rules),
        NodeType::Merge => object::merge(data, rules),
        NodeType::Filter => collection::filter(data, rules, context),
        NodeType::Aggregate => collection::aggregate(data, rules),
        NodeType::Group => collection::group(data, rules),
        NodeType::Formula => formula::formula(data, rules, context),
        NodeType::DateFormat => date::date_format(data, rules),
        NodeType::DateOperation => date::date_operation(data, rules),
        NodeType::Timestamp => date::timestamp(data, rules),
        other => Err(EngineError::config(format!("'{}' is not a data transform", other))),
    }
}

/// Wrap a transformed value the way every transform node reports it
pub fn transform_output(node_type: NodeType, result: Value) -> Value {
    json!({
        "result": result,
        "transformation_type": node_type.as_str(),
        "timestamp": iso(&Utc::now()),
    })
}

/// Handler for one pure transform node type
#[derive(Debug, Clone, Copy)]
pub struct TransformHandler {
    node_type: NodeType,
}

impl TransformHandler {
    pub fn new(node_type: NodeType) -> Result<Self> {
        if node_type.category() != NodeCategory::Transform || node_type == NodeType::CodeBlock {
            return Err(EngineError::config(format!("'{}' is not a data transform", node_type)));
        }
        Ok(Self { node_type })
    }

    /// Every node type served by a [`TransformHandler`]
    pub fn node_types() -> impl Iterator<Item = NodeType> {
        NodeType::ALL
            .into_iter()
            .filter(|t| t.category() == NodeCategory::Transform && *t != NodeType::CodeBlock)
    }
}

#[async_trait]
impl NodeHandler for TransformHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value> {
        let data = source_data(&input)?;
        let rules = resolved_rules(&input, PER_ITEM_KEYS)?;
        log::debug!("Applying {} transform for node '{}'", self.node_type, input.node.id);
        let result = apply(self.node_type, data, &rules, &input.context)?;
        Ok(transform_output(self.node_type, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_input;

    #[test]
    fn test_new_rejects_non_transforms() {
        assert!(TransformHandler::new(NodeType::Map).is_ok());
        for node_type in [NodeType::CodeBlock, NodeType::SendEmail, NodeType::Loop] {
            assert!(TransformHandler::new(node_type).is_err(), "{node_type}");
        }
        assert_eq!(TransformHandler::node_types().count(), 15);
    }

    #[tokio::test]
    async fn test_handle_wraps_result() {
        let handler = TransformHandler::new(NodeType::Filter).unwrap();
        let previous = json!({"result": [{"n": 1}, {"n": 5}], "transformation_type": "map"});
        let input = test_input(
            NodeType::Filter,
            json!({"condition": "item.n > {{ input.min }}"}),
            json!({"input": {"min": 2}}),
            Some(previous),
        );
        let out = handler.handle(input).await.unwrap();
        assert_eq!(out["result"], json!([{"n": 5}]));
        assert_eq!(out["transformation_type"], "filter");
        assert!(out["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_handle_resolves_templated_rules() {
        let handler = TransformHandler::new(NodeType::Rename).unwrap();
        let input = test_input(
            NodeType::Rename,
            json!({"from": "name", "to": "{{ input.key }}"}),
            json!({"input": {"key": "full_name", "name": "Ada"}}),
            None,
        );
        let out = handler.handle(input).await.unwrap();
        assert_eq!(out["result"], json!({"key": "full_name", "full_name": "Ada"}));
    }

    #[tokio::test]
    async fn test_merge_resolves_templated_object() {
        let handler = TransformHandler::new(NodeType::Merge).unwrap();
        let input = test_input(
            NodeType::Merge,
            json!({"with": "{{ input.defaults }}", "target": "settings", "strategy": "deep"}),
            json!({"input": {"defaults": {"retries": 3, "tls": {"verify": true}}}}),
            Some(json!({"result": {"settings": {"tls": {"ca": "root.pem"}}}})),
        );
        let out = handler.handle(input).await.unwrap();
        assert_eq!(
            out["result"],
            json!({"settings": {"retries": 3, "tls": {"ca": "root.pem", "verify": true}}})
        );
        assert_eq!(out["transformation_type"], "merge");
    }
}

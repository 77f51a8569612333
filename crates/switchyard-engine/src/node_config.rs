//! Typed configuration for the node types the engine interprets
//!
//! A node's JSON `config` is parsed once per dispatch into a [`NodeKind`].
//! Leaf handlers parse their own configs; the engine only needs enough to
//! pick the edge policy and to drive flow control.

use serde::{Deserialize, Serialize};

use crate::config::ExecutionSettings;
use crate::error::{EngineError, Result};
use crate::retry::RetryPolicy;
use crate::types::{EdgeCondition, Node, NodeType};

/// Joins a condition to the accumulated expression before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogicalOperator {
    #[default]
    #[serde(rename = "&&", alias = "AND", alias = "and")]
    And,
    #[serde(rename = "||", alias = "OR", alias = "or")]
    Or,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "&&",
            LogicalOperator::Or => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub expression: String,
    #[serde(default)]
    pub operator: Option<LogicalOperator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConditionalConfig {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// One declared switch case: a `case_<n>` label and its expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub condition: EdgeCondition,
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SwitchConfig {
    #[serde(default)]
    pub switch_cases: Vec<SwitchCase>,
}

impl SwitchConfig {
    /// Expression declared for a case label
    pub fn expression_for(&self, condition: &EdgeCondition) -> Option<&str> {
        self.switch_cases
            .iter()
            .find(|c| &c.condition == condition)
            .map(|c| c.expression.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopType {
    FixedCount,
    ForEach,
    WhileLoop,
}

impl LoopType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopType::FixedCount => "fixed_count",
            LoopType::ForEach => "for_each",
            LoopType::WhileLoop => "while_loop",
        }
    }
}

/// Raw loop node config as authored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub loop_type: LoopType,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub exit_condition: Option<String>,
    #[serde(default)]
    pub data_source_path: Option<String>,
}

/// A loop config with its required fields checked
#[derive(Debug, Clone, PartialEq)]
pub enum LoopStrategy {
    FixedCount { iterations: u32 },
    ForEach { data_source_path: String },
    WhileLoop { exit_condition: String, max_iterations: Option<u32> },
}

impl LoopStrategy {
    pub fn loop_type(&self) -> LoopType {
        match self {
            LoopStrategy::FixedCount { .. } => LoopType::FixedCount,
            LoopStrategy::ForEach { .. } => LoopType::ForEach,
            LoopStrategy::WhileLoop { .. } => LoopType::WhileLoop,
        }
    }
}

impl TryFrom<LoopConfig> for LoopStrategy {
    type Error = EngineError;

    fn try_from(config: LoopConfig) -> Result<Self> {
        fn required(value: Option<String>, field: &str, loop_type: LoopType) -> Result<String> {
            value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
                EngineError::config(format!("{} loop requires '{}'", loop_type.as_str(), field))
            })
        }

        match config.loop_type {
            LoopType::FixedCount => config
                .max_iterations
                .map(|iterations| LoopStrategy::FixedCount { iterations })
                .ok_or_else(|| EngineError::config("fixed_count loop requires 'max_iterations'")),
            LoopType::ForEach => Ok(LoopStrategy::ForEach {
                data_source_path: required(config.data_source_path, "data_source_path", LoopType::ForEach)?,
            }),
            LoopType::WhileLoop => Ok(LoopStrategy::WhileLoop {
                exit_condition: required(config.exit_condition, "exit_condition", LoopType::WhileLoop)?,
                max_iterations: config.max_iterations,
            }),
        }
    }
}

/// What the runner does with a node
#[derive(Debug, Clone)]
pub enum NodeKind {
    Conditional(ConditionalConfig),
    Switch(SwitchConfig),
    Loop(LoopStrategy),
    /// Side-effecting handler wrapped in the retry loop
    Action(RetryPolicy),
    /// Handler whose output carries `rule_evaluation_result`
    Rule,
    Transform,
}

impl NodeKind {
    pub fn from_node(node: &Node, settings: &ExecutionSettings) -> Result<Self> {
        match node.node_type {
            NodeType::Conditional => {
                let config: ConditionalConfig = parse_config(node)?;
                if config.conditions.is_empty() {
                    return Err(EngineError::config(format!(
                        "conditional node '{}' has no conditions",
                        node.id
                    )));
                }
                Ok(NodeKind::Conditional(config))
            }
            NodeType::Switch => Ok(NodeKind::Switch(parse_config(node)?)),
            NodeType::Loop => {
                let config: LoopConfig = parse_config(node)?;
                Ok(NodeKind::Loop(config.try_into()?))
            }
            NodeType::RuleExecutor => Ok(NodeKind::Rule),
            NodeType::SendEmail | NodeType::SendHttpRequest | NodeType::UpdateDatabase => {
                Ok(NodeKind::Action(RetryPolicy::from_node(node, settings)))
            }
            NodeType::Map
            | NodeType::Rename
            | NodeType::Remove
            | NodeType::Copy
            | NodeType::Filter
            | NodeType::Aggregate
            | NodeType::Group
            | NodeType::Concat
            | NodeType::Formula
            | NodeType::CodeBlock
            | NodeType::ConvertType
            | NodeType::Split
            | NodeType::Merge
            | NodeType::DateFormat
            | NodeType::DateOperation
            | NodeType::Timestamp => Ok(NodeKind::Transform),
        }
    }
}

/// Outgoing edge policy, chosen by node type alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgePolicy {
    /// `on_true` / `on_false` per a boolean outcome
    Branch,
    /// The edge of the selected switch case
    Case,
    /// The loop's dedicated exit edge
    LoopExit,
    /// The single `none` edge in the current group
    Sequential,
}

pub fn edge_policy(node_type: NodeType) -> EdgePolicy {
    match node_type {
        NodeType::Conditional | NodeType::RuleExecutor => EdgePolicy::Branch,
        NodeType::Switch => EdgePolicy::Case,
        NodeType::Loop => EdgePolicy::LoopExit,
        NodeType::SendEmail
        | NodeType::SendHttpRequest
        | NodeType::UpdateDatabase
        | NodeType::Map
        | NodeType::Rename
        | NodeType::Remove
        | NodeType::Copy
        | NodeType::Filter
        | NodeType::Aggregate
        | NodeType::Group
        | NodeType::Concat
        | NodeType::Formula
        | NodeType::CodeBlock
        | NodeType::ConvertType
        | NodeType::Split
        | NodeType::Merge
        | NodeType::DateFormat
        | NodeType::DateOperation
        | NodeType::Timestamp => EdgePolicy::Sequential,
    }
}

/// Deserialize a node's config, treating `null` as an empty object
pub fn parse_config<T: serde::de::DeserializeOwned>(node: &Node) -> Result<T> {
    let value = if node.config.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        node.config.clone()
    };
    serde_json::from_value(value).map_err(|e| {
        EngineError::config(format!(
            "invalid {} config for node '{}': {}",
            node.node_type, node.id, e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(node_type: NodeType, config: serde_json::Value) -> Node {
        Node::new("n1", "wf", node_type, config)
    }

    #[test]
    fn test_conditional_requires_conditions() {
        let settings = ExecutionSettings::default();
        let err = NodeKind::from_node(&node(NodeType::Conditional, json!({"conditions": []})), &settings)
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));

        let kind = NodeKind::from_node(
            &node(
                NodeType::Conditional,
                json!({"conditions": [{"expression": "a"}, {"expression": "b", "operator": "||"}]}),
            ),
            &settings,
        )
        .unwrap();
        match kind {
            NodeKind::Conditional(config) => {
                assert_eq!(config.conditions[1].operator, Some(LogicalOperator::Or));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_loop_strategies_check_required_fields() {
        let settings = ExecutionSettings::default();
        let missing = [
            json!({"loop_type": "fixed_count"}),
            json!({"loop_type": "for_each"}),
            json!({"loop_type": "while_loop", "exit_condition": "  "}),
        ];
        for config in missing {
            let err = NodeKind::from_node(&node(NodeType::Loop, config), &settings).unwrap_err();
            assert!(matches!(err, EngineError::Configuration(_)));
        }

        let kind = NodeKind::from_node(
            &node(NodeType::Loop, json!({"loop_type": "while_loop", "exit_condition": "$index >= 2", "max_iterations": 5})),
            &settings,
        )
        .unwrap();
        assert!(matches!(
            kind,
            NodeKind::Loop(LoopStrategy::WhileLoop { max_iterations: Some(5), .. })
        ));
    }

    #[test]
    fn test_unknown_loop_type_is_config_error() {
        let err = NodeKind::from_node(
            &node(NodeType::Loop, json!({"loop_type": "forever"})),
            &ExecutionSettings::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid loop config"));
    }

    #[test]
    fn test_switch_case_lookup() {
        let config: SwitchConfig = parse_config(&node(
            NodeType::Switch,
            json!({"switch_cases": [{"condition": "case_1", "expression": "x > 1"}]}),
        ))
        .unwrap();
        assert_eq!(config.expression_for(&EdgeCondition::Case(1)), Some("x > 1"));
        assert_eq!(config.expression_for(&EdgeCondition::Case(2)), None);
    }

    #[test]
    fn test_edge_policy_by_type() {
        assert_eq!(edge_policy(NodeType::RuleExecutor), EdgePolicy::Branch);
        assert_eq!(edge_policy(NodeType::Switch), EdgePolicy::Case);
        assert_eq!(edge_policy(NodeType::Loop), EdgePolicy::LoopExit);
        assert_eq!(edge_policy(NodeType::SendEmail), EdgePolicy::Sequential);
    }
}

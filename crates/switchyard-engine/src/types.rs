//! Graph and execution data model
//!
//! Workflows own their nodes and edges. The engine never mutates a workflow
//! while running it; authoring goes through the builder or a graph store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// Unique identifier for a workflow
pub type WorkflowId = String;

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Unique identifier for an execution
pub type ExecutionId = String;

/// Every node type the engine can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    // Actions
    SendEmail,
    SendHttpRequest,
    UpdateDatabase,
    // Flow control
    Conditional,
    Switch,
    Loop,
    RuleExecutor,
    // Data transforms
    Map,
    Rename,
    Remove,
    Copy,
    Filter,
    Aggregate,
    Group,
    Concat,
    Formula,
    CodeBlock,
    ConvertType,
    Split,
    Merge,
    DateFormat,
    DateOperation,
    Timestamp,
}

/// Broad grouping of node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Side-effecting leaf nodes; the only retried category
    Action,
    /// Nodes with more than one possible outgoing edge
    Flow,
    /// Pure data transforms
    Transform,
}

impl NodeType {
    pub const ALL: [NodeType; 23] = [
        NodeType::SendEmail,
        NodeType::SendHttpRequest,
        NodeType::UpdateDatabase,
        NodeType::Conditional,
        NodeType::Switch,
        NodeType::Loop,
        NodeType::RuleExecutor,
        NodeType::Map,
        NodeType::Rename,
        NodeType::Remove,
        NodeType::Copy,
        NodeType::Filter,
        NodeType::Aggregate,
        NodeType::Group,
        NodeType::Concat,
        NodeType::Formula,
        NodeType::CodeBlock,
        NodeType::ConvertType,
        NodeType::Split,
        NodeType::Merge,
        NodeType::DateFormat,
        NodeType::DateOperation,
        NodeType::Timestamp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::SendEmail => "send_email",
            NodeType::SendHttpRequest => "send_http_request",
            NodeType::UpdateDatabase => "update_database",
            NodeType::Conditional => "conditional",
            NodeType::Switch => "switch",
            NodeType::Loop => "loop",
            NodeType::RuleExecutor => "rule_executor",
            NodeType::Map => "map",
            NodeType::Rename => "rename",
            NodeType::Remove => "remove",
            NodeType::Copy => "copy",
            NodeType::Filter => "filter",
            NodeType::Aggregate => "aggregate",
            NodeType::Group => "group",
            NodeType::Concat => "concat",
            NodeType::Formula => "formula",
            NodeType::CodeBlock => "code_block",
            NodeType::ConvertType => "convert_type",
            NodeType::Split => "split",
            NodeType::Merge => "merge",
            NodeType::DateFormat => "date_format",
            NodeType::DateOperation => "date_operation",
            NodeType::Timestamp => "timestamp",
        }
    }

    pub fn category(&self) -> NodeCategory {
        match self {
            NodeType::SendEmail | NodeType::SendHttpRequest | NodeType::UpdateDatabase => {
                NodeCategory::Action
            }
            NodeType::Conditional | NodeType::Switch | NodeType::Loop | NodeType::RuleExecutor => {
                NodeCategory::Flow
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
            | NodeType::Timestamp => NodeCategory::Transform,
        }
    }

    /// Types the engine evaluates itself instead of a registered handler
    pub fn is_engine_owned(&self) -> bool {
        matches!(self, NodeType::Conditional | NodeType::Switch | NodeType::Loop)
    }

    /// Types whose outcome picks `on_true` / `on_false`
    pub fn is_branching(&self) -> bool {
        matches!(self, NodeType::Conditional | NodeType::RuleExecutor)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EngineError::config(format!("unknown node type '{}'", s)))
    }
}

/// Condition tag carried by an edge
///
/// Serialized as its label: `on_true`, `on_false`, `none` or `case_<n>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EdgeCondition {
    OnTrue,
    OnFalse,
    None,
    Case(u32),
}

impl EdgeCondition {
    pub fn branch(passed: bool) -> Self {
        if passed {
            EdgeCondition::OnTrue
        } else {
            EdgeCondition::OnFalse
        }
    }

    pub fn is_case(&self) -> bool {
        matches!(self, EdgeCondition::Case(_))
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, EdgeCondition::OnTrue | EdgeCondition::OnFalse)
    }

    pub fn label(&self) -> String {
        match self {
            EdgeCondition::OnTrue => "on_true".to_string(),
            EdgeCondition::OnFalse => "on_false".to_string(),
            EdgeCondition::None => "none".to_string(),
            EdgeCondition::Case(n) => format!("case_{}", n),
        }
    }
}

impl fmt::Display for EdgeCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for EdgeCondition {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_true" => Ok(EdgeCondition::OnTrue),
            "on_false" => Ok(EdgeCondition::OnFalse),
            "none" => Ok(EdgeCondition::None),
            other => other
                .strip_prefix("case_")
                .and_then(|n| n.parse::<u32>().ok())
                .map(EdgeCondition::Case)
                .ok_or_else(|| EngineError::config(format!("invalid edge condition '{}'", other))),
        }
    }
}

impl TryFrom<String> for EdgeCondition {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EdgeCondition> for String {
    fn from(value: EdgeCondition) -> Self {
        value.label()
    }
}

/// A typed unit of work in a workflow graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub workflow_id: WorkflowId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Type-specific configuration, parsed into a typed config at dispatch
    #[serde(default)]
    pub config: Value,
    /// Loop node that owns this node, if it sits inside a loop body
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub retry_attempts: u32,
    #[serde(default)]
    pub retry_delay_ms: u64,
}

impl Node {
    pub fn new(
        id: impl Into<NodeId>,
        workflow_id: impl Into<WorkflowId>,
        node_type: NodeType,
        config: Value,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            workflow_id: workflow_id.into(),
            node_type,
            config,
            parent_id: None,
            retry_attempts: 0,
            retry_delay_ms: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay_ms = delay_ms;
        self
    }
}

/// A directed, condition-tagged connection between two nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub workflow_id: WorkflowId,
    pub source: NodeId,
    pub target: NodeId,
    pub condition: EdgeCondition,
    /// Loop node whose subgraph this edge belongs to
    #[serde(default)]
    pub group_id: Option<NodeId>,
    /// Case expression, switch edges only
    #[serde(default)]
    pub expression: Option<String>,
}

impl Edge {
    pub fn new(
        id: impl Into<EdgeId>,
        workflow_id: impl Into<WorkflowId>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        condition: EdgeCondition,
    ) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            source: source.into(),
            target: target.into(),
            condition,
            group_id: None,
            expression: None,
        }
    }

    pub fn in_group(mut self, group_id: impl Into<NodeId>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// True for an edge scoped to the loop it starts from
    pub fn is_subgraph_entry(&self) -> bool {
        self.group_id.as_deref() == Some(self.source.as_str())
    }
}

/// A workflow: a named graph of nodes and edges
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

fn default_enabled() -> bool {
    true
}

impl Workflow {
    pub fn new(id: impl Into<WorkflowId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            description: String::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn find_node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub fn find_node_mut(&mut self, node_id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == node_id)
    }

    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.source == node_id).collect()
    }

    pub fn incoming_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.target == node_id).collect()
    }

    /// Nodes with no incoming edge other than their own loop back-edges
    pub fn entry_candidates(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|node| {
                !self
                    .edges
                    .iter()
                    .any(|e| e.target == node.id && e.group_id.as_deref() != Some(node.id.as_str()))
            })
            .collect()
    }

    /// Mark every grouped edge's target as owned by that loop
    pub fn assign_parents(&mut self) {
        let owned: Vec<(NodeId, NodeId)> = self
            .edges
            .iter()
            .filter_map(|e| match &e.group_id {
                Some(group) if *group != e.target => Some((e.target.clone(), group.clone())),
                _ => None,
            })
            .collect();
        for (node_id, group) in owned {
            if let Some(node) = self.find_node_mut(&node_id) {
                node.parent_id = Some(group);
            }
        }
    }

    /// The traversal start point, when exactly one candidate exists
    pub fn entry_node(&self) -> Option<&Node> {
        match self.entry_candidates().as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

/// Lifecycle of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Running => f.write_str("running"),
            ExecutionStatus::Completed => f.write_str("completed"),
            ExecutionStatus::Failed => f.write_str("failed"),
        }
    }
}

/// One run of a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub trigger_id: Option<String>,
    pub status: ExecutionStatus,
    /// Context snapshot as of the last persisted step
    pub context: Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Per-node audit events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    Start,
    Success,
    Failure,
    Retry,
}

/// Unique identifier for a node log entry
pub type LogId = String;

/// Append-only audit record for one node step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionLog {
    pub id: LogId,
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub status: LogEvent,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub data: Option<Value>,
}

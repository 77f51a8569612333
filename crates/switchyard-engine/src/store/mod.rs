//! Storage interfaces
//!
//! The engine reads graphs through [`GraphStore`] and records runs through
//! [`ExecutionStore`]. In-memory implementations back tests and embedded use;
//! the graph store can also persist workflows as JSON files.

mod execution;
mod graph;

pub use execution::InMemoryExecutionStore;
pub use graph::InMemoryGraphStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;
use crate::types::{
    Edge, EdgeCondition, Execution, ExecutionId, ExecutionStatus, LogEvent, LogId, Node, NodeExecutionLog, NodeId,
    Workflow,
};

/// Read side used during a run plus the authoring operations
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>>;

    /// The unique node with no incoming edge; `None` for an empty workflow
    async fn entry_node(&self, workflow_id: &str) -> Result<Option<Node>>;

    async fn get_node(&self, node_id: &str) -> Result<Option<Node>>;

    /// Target of the edge leaving `node_id` with `condition` inside `group_id`
    async fn next_node_id(
        &self,
        node_id: &str,
        condition: &EdgeCondition,
        group_id: Option<&str>,
    ) -> Result<Option<NodeId>>;

    /// Target of a loop's exit edge
    async fn next_node_after_loop(&self, loop_id: &str) -> Result<Option<NodeId>>;

    /// Outgoing edges of a switch node ordered by condition ascending
    async fn switch_edges(&self, node_id: &str) -> Result<Vec<Edge>>;

    /// Store a complete workflow after sealing validation
    async fn insert_workflow(&self, workflow: Workflow) -> Result<()>;

    async fn create_node(&self, node: Node) -> Result<Node>;

    /// Add one edge after incremental validation
    async fn create_edge(&self, edge: Edge) -> Result<Edge>;

    /// Replace a node's name, config and retry settings; its type is fixed
    async fn update_node(&self, node: Node) -> Result<Node>;

    async fn delete_edge(&self, edge_id: &str) -> Result<()>;
}

/// A node log entry before the store assigns its id and start time
#[derive(Debug, Clone)]
pub struct NodeLogEntry {
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub status: LogEvent,
    pub data: Option<Value>,
}

impl NodeLogEntry {
    pub fn new(execution_id: &str, node_id: &str, status: LogEvent, data: Option<Value>) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            status,
            data,
        }
    }
}

/// Execution records and the per-node audit trail
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Create a `running` execution
    async fn create_execution(
        &self,
        workflow_id: &str,
        trigger_id: Option<&str>,
        context: Value,
    ) -> Result<Execution>;

    async fn update_execution(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        context: Value,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn log_node_execution(&self, entry: NodeLogEntry) -> Result<LogId>;

    async fn update_node_execution_log(
        &self,
        log_id: &str,
        status: LogEvent,
        completed_at: Option<DateTime<Utc>>,
        data: Option<Value>,
    ) -> Result<()>;

    async fn get_execution(&self, execution_id: &str) -> Result<Option<Execution>>;

    /// Log entries of one execution in insertion order
    async fn node_logs(&self, execution_id: &str) -> Result<Vec<NodeExecutionLog>>;
}

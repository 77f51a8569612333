//! Fluent builder for workflow graphs
//!
//! Provides a fluent API for constructing workflows programmatically. Unlike
//! the graph store, the builder checks the finished graph in one pass.

use serde_json::Value;

use crate::error::Result;
use crate::types::{Edge, EdgeCondition, Node, NodeId, NodeType, Workflow};
use crate::validation::{ensure_valid, validate_workflow};

/// Fluent builder for constructing workflows
///
/// # Example
///
/// ```ignore
/// let workflow = WorkflowBuilder::new("wf-1", "Order follow-up")
///     .node("check", NodeType::Conditional, json!({"conditions": [{"expression": "$.input.total > 100"}]}))
///     .node("vip", NodeType::SendEmail, json!({"to": "sales@example.com"}))
///     .node("log", NodeType::Map, json!({"seen": true}))
///     .edge("check", "vip", EdgeCondition::OnTrue)
///     .edge("check", "log", EdgeCondition::OnFalse)
///     .build()?;
/// ```
pub struct WorkflowBuilder {
    workflow: Workflow,
    edge_counter: usize,
}

impl WorkflowBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            workflow: Workflow::new(id, name),
            edge_counter: 0,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.workflow.description = description.into();
        self
    }

    /// Build the workflow switched off
    pub fn disabled(mut self) -> Self {
        self.workflow.enabled = false;
        self
    }

    /// Add a node to the graph
    pub fn node(mut self, id: impl Into<NodeId>, node_type: NodeType, config: Value) -> Self {
        let node = Node::new(id, self.workflow.id.clone(), node_type, config);
        self.workflow.nodes.push(node);
        self
    }

    /// Add an action node with a retry policy
    pub fn node_with_retry(
        mut self,
        id: impl Into<NodeId>,
        node_type: NodeType,
        config: Value,
        attempts: u32,
        delay_ms: u64,
    ) -> Self {
        let node = Node::new(id, self.workflow.id.clone(), node_type, config).with_retry(attempts, delay_ms);
        self.workflow.nodes.push(node);
        self
    }

    /// Set the display name of the most recently added node
    ///
    /// Must be called immediately after `node`.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        if let Some(node) = self.workflow.nodes.last_mut() {
            node.name = name.into();
        }
        self
    }

    /// Add a top-level edge (auto-generates edge ID)
    pub fn edge(self, source: impl Into<NodeId>, target: impl Into<NodeId>, condition: EdgeCondition) -> Self {
        self.push_edge(source, target, condition, None, None)
    }

    /// Add an edge inside the body of loop `group`
    ///
    /// An edge whose source is the loop itself becomes the loop's
    /// subgraph-entry edge, and an edge targeting the loop closes the body.
    pub fn grouped_edge(
        self,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        condition: EdgeCondition,
        group: impl Into<NodeId>,
    ) -> Self {
        self.push_edge(source, target, condition, Some(group.into()), None)
    }

    /// Add a `case_<n>` edge from a switch node
    pub fn case_edge(
        self,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        case: u32,
        expression: impl Into<String>,
    ) -> Self {
        self.push_edge(source, target, EdgeCondition::Case(case), None, Some(expression.into()))
    }

    fn push_edge(
        mut self,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        condition: EdgeCondition,
        group: Option<NodeId>,
        expression: Option<String>,
    ) -> Self {
        self.edge_counter += 1;
        let mut edge = Edge::new(
            format!("edge-{}", self.edge_counter),
            self.workflow.id.clone(),
            source,
            target,
            condition,
        );
        edge.group_id = group;
        edge.expression = expression;
        self.workflow.edges.push(edge);
        self
    }

    /// Build the workflow without checking its topology
    pub fn build_unchecked(mut self) -> Workflow {
        self.workflow.assign_parents();
        self.workflow
    }

    /// Build and validate the workflow, reporting every violation found
    pub fn build(self) -> Result<Workflow> {
        let workflow = self.build_unchecked();
        ensure_valid(validate_workflow(&workflow))?;
        Ok(workflow)
    }
}

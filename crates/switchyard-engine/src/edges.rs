//! Edge resolution
//!
//! Free functions answer "which edge leaves this node" against a workflow
//! value; [`EdgeResolver`] asks the same questions of a [`GraphStore`] during
//! a run.

use crate::error::Result;
use crate::store::GraphStore;
use crate::types::{Edge, EdgeCondition, NodeId, Workflow};

/// The edge leaving `node_id` with `condition` inside `group_id`
pub fn next_edge<'a>(
    workflow: &'a Workflow,
    node_id: &str,
    condition: &EdgeCondition,
    group_id: Option<&str>,
) -> Option<&'a Edge> {
    workflow.edges.iter().find(|e| {
        e.source == node_id && &e.condition == condition && e.group_id.as_deref() == group_id
    })
}

/// A loop's exit edge: condition `none`, scoped to the group the loop itself
/// lives in (none for a top-level loop), never its own subgraph-entry edge.
pub fn exit_edge<'a>(workflow: &'a Workflow, loop_id: &str) -> Option<&'a Edge> {
    let parent = workflow.find_node(loop_id)?.parent_id.as_deref();
    workflow.edges.iter().find(|e| {
        e.source == loop_id
            && e.condition == EdgeCondition::None
            && e.group_id.as_deref() == parent
            && !e.is_subgraph_entry()
    })
}

/// All edges leaving a switch node, ordered by condition label ascending
pub fn ordered_switch_edges<'a>(workflow: &'a Workflow, node_id: &str) -> Vec<&'a Edge> {
    let mut edges = workflow.outgoing_edges(node_id);
    edges.sort_by_key(|e| e.condition.label());
    edges
}

/// Runtime edge lookups backed by a graph store
pub struct EdgeResolver<'a> {
    graph: &'a dyn GraphStore,
}

impl<'a> EdgeResolver<'a> {
    pub fn new(graph: &'a dyn GraphStore) -> Self {
        Self { graph }
    }

    pub async fn next(
        &self,
        node_id: &str,
        condition: &EdgeCondition,
        group_id: Option<&str>,
    ) -> Result<Option<NodeId>> {
        let next = self.graph.next_node_id(node_id, condition, group_id).await?;
        log::debug!(
            "Edge {} --{}{}--> {:?}",
            node_id,
            condition,
            group_id.map(|g| format!(" [{}]", g)).unwrap_or_default(),
            next
        );
        Ok(next)
    }

    pub async fn branch(&self, node_id: &str, passed: bool, group_id: Option<&str>) -> Result<Option<NodeId>> {
        self.next(node_id, &EdgeCondition::branch(passed), group_id).await
    }

    /// First node of a loop's body
    pub async fn subgraph_entry(&self, loop_id: &str) -> Result<Option<NodeId>> {
        self.next(loop_id, &EdgeCondition::None, Some(loop_id)).await
    }

    pub async fn after_loop(&self, loop_id: &str) -> Result<Option<NodeId>> {
        let next = self.graph.next_node_after_loop(loop_id).await?;
        log::debug!("Loop {} exits to {:?}", loop_id, next);
        Ok(next)
    }

    pub async fn switch_edges(&self, node_id: &str) -> Result<Vec<Edge>> {
        self.graph.switch_edges(node_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Node, NodeType};
    use serde_json::json;

    fn looped_workflow() -> Workflow {
        let mut wf = Workflow::new("wf", "Loops");
        wf.nodes.push(Node::new("outer", "wf", NodeType::Loop, json!({})));
        let mut inner = Node::new("inner", "wf", NodeType::Loop, json!({}));
        inner.parent_id = Some("outer".into());
        wf.nodes.push(inner);
        let mut tail = Node::new("tail", "wf", NodeType::Map, json!({}));
        tail.parent_id = Some("outer".into());
        wf.nodes.push(tail);
        wf.nodes.push(Node::new("done", "wf", NodeType::Map, json!({})));

        wf.edges.push(Edge::new("e1", "wf", "outer", "inner", EdgeCondition::None).in_group("outer"));
        wf.edges.push(Edge::new("e2", "wf", "inner", "tail", EdgeCondition::None).in_group("outer"));
        wf.edges.push(Edge::new("e3", "wf", "tail", "outer", EdgeCondition::None).in_group("outer"));
        wf.edges.push(Edge::new("e4", "wf", "outer", "done", EdgeCondition::None));
        wf
    }

    #[test]
    fn test_next_edge_respects_group() {
        let wf = looped_workflow();
        assert_eq!(
            next_edge(&wf, "outer", &EdgeCondition::None, Some("outer")).map(|e| e.target.as_str()),
            Some("inner")
        );
        assert_eq!(
            next_edge(&wf, "outer", &EdgeCondition::None, None).map(|e| e.target.as_str()),
            Some("done")
        );
        assert!(next_edge(&wf, "tail", &EdgeCondition::None, None).is_none());
    }

    #[test]
    fn test_exit_edge_uses_enclosing_scope() {
        let wf = looped_workflow();
        assert_eq!(exit_edge(&wf, "outer").map(|e| e.target.as_str()), Some("done"));
        assert_eq!(exit_edge(&wf, "inner").map(|e| e.target.as_str()), Some("tail"));
        assert!(exit_edge(&wf, "missing").is_none());
    }

    #[test]
    fn test_switch_edges_sorted_by_label() {
        let mut wf = Workflow::new("wf", "Switch");
        wf.nodes.push(Node::new("s", "wf", NodeType::Switch, json!({})));
        for (id, condition) in [
            ("e1", EdgeCondition::None),
            ("e2", EdgeCondition::Case(2)),
            ("e3", EdgeCondition::Case(1)),
        ] {
            wf.edges.push(Edge::new(id, "wf", "s", id, condition));
        }
        let ids: Vec<&str> = ordered_switch_edges(&wf, "s").iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e3", "e2", "e1"]);
    }
}

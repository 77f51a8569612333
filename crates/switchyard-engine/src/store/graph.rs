//! In-memory graph store with optional file persistence
//!
//! Workflows are held in memory for traversal. When a persistence directory
//! is configured every mutation rewrites `<dir>/<workflow_id>.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::GraphStore;
use crate::edges;
use crate::error::{EngineError, Result};
use crate::node_config::{parse_config, SwitchConfig};
use crate::types::{Edge, EdgeCondition, Node, NodeId, NodeType, Workflow, WorkflowId};
use crate::validation::{ensure_valid, validate_edge, validate_workflow, TopologyViolation};

/// Graph store keeping workflows in memory.
///
/// # Example
///
/// ```ignore
/// use switchyard_engine::InMemoryGraphStore;
///
/// let store = InMemoryGraphStore::with_persistence(".switchyard/workflows");
/// let count = store.load_from_disk().await?;
/// store.insert_workflow(workflow).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
    /// Node id to owning workflow
    node_index: RwLock<HashMap<NodeId, WorkflowId>>,
    persist_path: Option<PathBuf>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that persists to the given directory.
    ///
    /// The directory is created on first save.
    pub fn with_persistence(path: impl AsRef<Path>) -> Self {
        Self {
            persist_path: Some(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Load every `*.json` workflow from the persistence directory.
    ///
    /// Files that fail to parse are skipped with a warning. Loaded workflows
    /// are taken as-is, without sealing validation. Returns the number loaded.
    pub async fn load_from_disk(&self) -> Result<usize> {
        let Some(path) = &self.persist_path else {
            return Ok(0);
        };
        if !tokio::fs::try_exists(path).await? {
            return Ok(0);
        }

        let mut count = 0;
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_path = entry.path();
            if file_path.extension().is_some_and(|e| e == "json") {
                let content = tokio::fs::read_to_string(&file_path).await?;
                match serde_json::from_str::<Workflow>(&content) {
                    Ok(workflow) => {
                        log::info!("Loaded workflow '{}' from {:?}", workflow.id, file_path);
                        self.put(workflow);
                        count += 1;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse workflow from {:?}: {}", file_path, e);
                    }
                }
            }
        }
        Ok(count)
    }

    /// Ids of every stored workflow
    pub fn workflow_ids(&self) -> Vec<WorkflowId> {
        let mut ids: Vec<WorkflowId> = self.workflows.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Switch a workflow on or off
    pub async fn set_enabled(&self, workflow_id: &str, enabled: bool) -> Result<()> {
        let snapshot = self.modify(workflow_id, |wf| {
            wf.enabled = enabled;
            Ok(())
        })?;
        self.save_to_disk(&snapshot).await
    }

    fn put(&self, workflow: Workflow) {
        let mut index = self.node_index.write();
        index.retain(|_, wf| *wf != workflow.id);
        for node in &workflow.nodes {
            index.insert(node.id.clone(), workflow.id.clone());
        }
        self.workflows.write().insert(workflow.id.clone(), workflow);
    }

    fn workflow_of(&self, node_id: &str) -> Option<WorkflowId> {
        self.node_index.read().get(node_id).cloned()
    }

    /// Run `f` against the owning workflow of `node_id`
    fn with_node_workflow<T>(&self, node_id: &str, f: impl FnOnce(&Workflow) -> T) -> Option<T> {
        let workflow_id = self.workflow_of(node_id)?;
        self.workflows.read().get(&workflow_id).map(f)
    }

    /// Mutate a workflow under the write lock, returning a copy for persistence
    fn modify<T>(&self, workflow_id: &str, f: impl FnOnce(&mut Workflow) -> Result<T>) -> Result<Workflow> {
        let mut workflows = self.workflows.write();
        let workflow = workflows
            .get_mut(workflow_id)
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
        f(workflow)?;
        Ok(workflow.clone())
    }

    async fn save_to_disk(&self, workflow: &Workflow) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        tokio::fs::create_dir_all(path).await?;
        let file_path = path.join(format!("{}.json", workflow.id));
        let content = serde_json::to_string_pretty(workflow)?;
        tokio::fs::write(&file_path, content).await?;
        log::debug!("Saved workflow '{}' to {:?}", workflow.id, file_path);
        Ok(())
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>> {
        Ok(self.workflows.read().get(workflow_id).cloned())
    }

    async fn entry_node(&self, workflow_id: &str) -> Result<Option<Node>> {
        let workflows = self.workflows.read();
        let workflow = workflows
            .get(workflow_id)
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
        if workflow.nodes.is_empty() {
            return Ok(None);
        }
        match workflow.entry_candidates().as_slice() {
            [only] => Ok(Some((*only).clone())),
            [] => Err(EngineError::topology(TopologyViolation::NoEntryNode)),
            many => Err(EngineError::topology(TopologyViolation::MultipleEntryNodes {
                node_ids: many.iter().map(|n| n.id.clone()).collect(),
            })),
        }
    }

    async fn get_node(&self, node_id: &str) -> Result<Option<Node>> {
        Ok(self
            .with_node_workflow(node_id, |wf| wf.find_node(node_id).cloned())
            .flatten())
    }

    async fn next_node_id(
        &self,
        node_id: &str,
        condition: &EdgeCondition,
        group_id: Option<&str>,
    ) -> Result<Option<NodeId>> {
        Ok(self
            .with_node_workflow(node_id, |wf| {
                edges::next_edge(wf, node_id, condition, group_id).map(|e| e.target.clone())
            })
            .flatten())
    }

    async fn next_node_after_loop(&self, loop_id: &str) -> Result<Option<NodeId>> {
        Ok(self
            .with_node_workflow(loop_id, |wf| edges::exit_edge(wf, loop_id).map(|e| e.target.clone()))
            .flatten())
    }

    async fn switch_edges(&self, node_id: &str) -> Result<Vec<Edge>> {
        Ok(self
            .with_node_workflow(node_id, |wf| {
                edges::ordered_switch_edges(wf, node_id)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_workflow(&self, mut workflow: Workflow) -> Result<()> {
        workflow.assign_parents();
        ensure_valid(validate_workflow(&workflow))?;
        {
            let index = self.node_index.read();
            let clash: Vec<TopologyViolation> = workflow
                .nodes
                .iter()
                .filter(|n| index.get(&n.id).is_some_and(|owner| *owner != workflow.id))
                .map(|n| TopologyViolation::DuplicateId { id: n.id.clone() })
                .collect();
            ensure_valid(clash)?;
        }
        self.save_to_disk(&workflow).await?;
        log::info!(
            "Stored workflow '{}' ({} nodes, {} edges)",
            workflow.id,
            workflow.nodes.len(),
            workflow.edges.len()
        );
        self.put(workflow);
        Ok(())
    }

    async fn create_node(&self, node: Node) -> Result<Node> {
        if self.workflow_of(&node.id).is_some() {
            return Err(EngineError::topology(TopologyViolation::DuplicateId { id: node.id.clone() }));
        }
        let snapshot = self.modify(&node.workflow_id, |wf| {
            wf.nodes.push(node.clone());
            Ok(())
        })?;
        self.node_index
            .write()
            .insert(node.id.clone(), node.workflow_id.clone());
        self.save_to_disk(&snapshot).await?;
        log::debug!("Created {} node '{}' in '{}'", node.node_type, node.id, node.workflow_id);
        Ok(node)
    }

    async fn create_edge(&self, mut edge: Edge) -> Result<Edge> {
        let workflow_id = edge.workflow_id.clone();
        let snapshot = self.modify(&workflow_id, |wf| {
            if wf.edges.iter().any(|e| e.id == edge.id) {
                return Err(EngineError::topology(TopologyViolation::DuplicateId { id: edge.id.clone() }));
            }
            if edge.condition.is_case() && edge.expression.is_none() {
                if let Some(source) = wf.find_node(&edge.source).filter(|n| n.node_type == NodeType::Switch) {
                    let config: SwitchConfig = parse_config(source)?;
                    edge.expression = config.expression_for(&edge.condition).map(str::to_string);
                }
            }
            ensure_valid(validate_edge(wf, &edge))?;

            if let Some(group) = edge.group_id.clone().filter(|g| *g != edge.target) {
                if let Some(target) = wf.find_node_mut(&edge.target) {
                    target.parent_id = Some(group);
                }
            }
            wf.edges.push(edge.clone());
            Ok(())
        })?;
        self.save_to_disk(&snapshot).await?;
        log::debug!(
            "Created edge '{}': {} --{}--> {}",
            edge.id,
            edge.source,
            edge.condition,
            edge.target
        );
        Ok(edge)
    }

    async fn update_node(&self, node: Node) -> Result<Node> {
        let workflow_id = self
            .workflow_of(&node.id)
            .ok_or_else(|| EngineError::NodeNotFound(node.id.clone()))?;
        let mut updated = node.clone();
        let snapshot = self.modify(&workflow_id, |wf| {
            let existing = wf
                .find_node(&node.id)
                .ok_or_else(|| EngineError::NodeNotFound(node.id.clone()))?;
            if existing.node_type != node.node_type {
                return Err(EngineError::config(format!(
                    "node '{}' is {} and cannot become {}",
                    node.id, existing.node_type, node.node_type
                )));
            }
            // structural fields stay with the store
            updated.workflow_id = existing.workflow_id.clone();
            updated.parent_id = existing.parent_id.clone();

            if node.node_type == NodeType::Switch {
                let config: SwitchConfig = parse_config(&updated)?;
                wf.edges.retain(|e| {
                    e.source != node.id || !e.condition.is_case() || config.expression_for(&e.condition).is_some()
                });
                for edge in wf.edges.iter_mut().filter(|e| e.source == node.id) {
                    if let Some(expression) = config.expression_for(&edge.condition) {
                        edge.expression = Some(expression.to_string());
                    }
                }
            }

            if let Some(slot) = wf.find_node_mut(&node.id) {
                *slot = updated.clone();
            }
            Ok(())
        })?;
        self.save_to_disk(&snapshot).await?;
        Ok(updated)
    }

    async fn delete_edge(&self, edge_id: &str) -> Result<()> {
        let workflow_id = self
            .workflows
            .read()
            .values()
            .find(|wf| wf.edges.iter().any(|e| e.id == edge_id))
            .map(|wf| wf.id.clone())
            .ok_or_else(|| EngineError::store(format!("edge '{}' not found", edge_id)))?;
        let snapshot = self.modify(&workflow_id, |wf| {
            wf.edges.retain(|e| e.id != edge_id);
            Ok(())
        })?;
        self.save_to_disk(&snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn linear_workflow() -> Workflow {
        let mut wf = Workflow::new("wf", "Linear");
        wf.nodes.push(Node::new("a", "wf", NodeType::Map, json!({})));
        wf.nodes.push(Node::new("b", "wf", NodeType::Map, json!({})));
        wf.edges.push(Edge::new("e1", "wf", "a", "b", EdgeCondition::None));
        wf
    }

    #[tokio::test]
    async fn test_insert_and_traverse() {
        let store = InMemoryGraphStore::new();
        store.insert_workflow(linear_workflow()).await.unwrap();

        assert_eq!(store.entry_node("wf").await.unwrap().unwrap().id, "a");
        assert_eq!(
            store.next_node_id("a", &EdgeCondition::None, None).await.unwrap(),
            Some("b".to_string())
        );
        assert_eq!(store.next_node_id("b", &EdgeCondition::None, None).await.unwrap(), None);
        assert!(store.get_node("b").await.unwrap().is_some());
        assert!(store.get_node("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_graph() {
        let store = InMemoryGraphStore::new();
        let mut wf = linear_workflow();
        wf.nodes.push(Node::new("c", "wf", NodeType::Map, json!({})));
        let err = store.insert_workflow(wf).await.unwrap_err();
        assert!(matches!(err, EngineError::GraphTopology(_)));
        assert!(store.get_workflow("wf").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_incremental_authoring() {
        let store = InMemoryGraphStore::new();
        store.insert_workflow(Workflow::new("wf", "Built")).await.unwrap();
        store
            .create_node(Node::new("loop", "wf", NodeType::Loop, json!({"loop_type": "fixed_count", "max_iterations": 2})))
            .await
            .unwrap();
        store.create_node(Node::new("body", "wf", NodeType::Map, json!({}))).await.unwrap();

        // no placeholder self edge is created for loops
        assert!(store.get_workflow("wf").await.unwrap().unwrap().edges.is_empty());

        let self_edge = Edge::new("bad", "wf", "loop", "loop", EdgeCondition::None).in_group("loop");
        assert!(store.create_edge(self_edge).await.is_err());

        store
            .create_edge(Edge::new("e1", "wf", "loop", "body", EdgeCondition::None).in_group("loop"))
            .await
            .unwrap();
        let body = store.get_node("body").await.unwrap().unwrap();
        assert_eq!(body.parent_id.as_deref(), Some("loop"));

        let dup = store.create_node(Node::new("body", "wf", NodeType::Map, json!({}))).await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_update_node_keeps_type_and_syncs_cases() {
        let store = InMemoryGraphStore::new();
        store.insert_workflow(Workflow::new("wf", "Switch")).await.unwrap();
        store
            .create_node(Node::new(
                "s",
                "wf",
                NodeType::Switch,
                json!({"switch_cases": [
                    {"condition": "case_1", "expression": "x == 1"},
                    {"condition": "case_2", "expression": "x == 2"}
                ]}),
            ))
            .await
            .unwrap();
        store.create_node(Node::new("one", "wf", NodeType::Map, json!({}))).await.unwrap();
        store.create_node(Node::new("two", "wf", NodeType::Map, json!({}))).await.unwrap();

        // expression is taken from the node's switch_cases
        let e1 = store
            .create_edge(Edge::new("e1", "wf", "s", "one", EdgeCondition::Case(1)))
            .await
            .unwrap();
        assert_eq!(e1.expression.as_deref(), Some("x == 1"));
        store
            .create_edge(Edge::new("e2", "wf", "s", "two", EdgeCondition::Case(2)))
            .await
            .unwrap();

        let mut node = store.get_node("s").await.unwrap().unwrap();
        node.config = json!({"switch_cases": [{"condition": "case_1", "expression": "x >= 1"}]});
        store.update_node(node.clone()).await.unwrap();

        let edges = store.switch_edges("s").await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].expression.as_deref(), Some("x >= 1"));

        node.node_type = NodeType::Map;
        assert!(store.update_node(node).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_edge() {
        let store = InMemoryGraphStore::new();
        store.insert_workflow(linear_workflow()).await.unwrap();
        store.delete_edge("e1").await.unwrap();
        assert_eq!(store.next_node_id("a", &EdgeCondition::None, None).await.unwrap(), None);
        assert!(store.delete_edge("e1").await.is_err());
    }

    #[tokio::test]
    async fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryGraphStore::with_persistence(dir.path());
        store.insert_workflow(linear_workflow()).await.unwrap();
        store.set_enabled("wf", false).await.unwrap();

        let reloaded = InMemoryGraphStore::with_persistence(dir.path());
        assert_eq!(reloaded.load_from_disk().await.unwrap(), 1);
        let wf = reloaded.get_workflow("wf").await.unwrap().unwrap();
        assert!(!wf.enabled);
        assert_eq!(reloaded.workflow_ids(), vec!["wf".to_string()]);
        assert_eq!(
            reloaded.next_node_id("a", &EdgeCondition::None, None).await.unwrap(),
            Some("b".to_string())
        );
    }

    #[tokio::test]
    async fn test_entry_node_of_unsealed_graph() {
        let store = InMemoryGraphStore::new();
        store.insert_workflow(Workflow::new("wf", "Empty")).await.unwrap();
        assert!(store.entry_node("wf").await.unwrap().is_none());

        store.create_node(Node::new("a", "wf", NodeType::Map, json!({}))).await.unwrap();
        store.create_node(Node::new("b", "wf", NodeType::Map, json!({}))).await.unwrap();
        assert!(matches!(
            store.entry_node("wf").await.unwrap_err(),
            EngineError::GraphTopology(_)
        ));
        assert!(matches!(
            store.entry_node("nope").await.unwrap_err(),
            EngineError::WorkflowNotFound(_)
        ));
    }
}

//! Graph topology validation
//!
//! Edge rules are checked one edge at a time against the edges already in
//! the workflow ([`validate_edge`]), which is what a graph store does on
//! edge creation. Sealing a whole workflow ([`validate_workflow`]) replays
//! every edge in insertion order and then adds the rules that only make
//! sense for a finished graph: both branches present, one entry node.

use std::collections::HashSet;
use std::fmt;

use crate::error::{EngineError, Result};
use crate::types::{Edge, EdgeCondition, NodeCategory, NodeType, Workflow};

/// A single topology rule violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyViolation {
    /// An edge references a node that does not exist
    UnknownNode { edge_id: String, node_id: String },
    /// An edge or node belongs to another workflow
    ForeignWorkflow { id: String, workflow_id: String },
    /// Two nodes or two edges share an id
    DuplicateId { id: String },
    /// `group_id` does not name a loop node
    GroupNotLoop { edge_id: String, group_id: String },
    /// The source node type does not accept this condition tag
    ConditionNotAllowed {
        node_id: String,
        node_type: NodeType,
        condition: String,
    },
    /// The same condition tag is used twice on one node
    DuplicateCondition { node_id: String, condition: String },
    /// The source node already has its maximum number of outgoing edges
    TooManyOutgoing { node_id: String, max: usize },
    /// A loop already has its exit or its subgraph-entry edge
    DuplicateLoopEdge { node_id: String, kind: &'static str },
    /// A loop's subgraph-entry edge points back at the loop
    SelfPointingLoopBody { node_id: String },
    /// An edge from a node to itself outside a loop
    SelfLoop { node_id: String },
    /// The target already has its allowed incoming edge
    TooManyIncoming { node_id: String },
    /// A branching node lacks one of its two edges
    MissingBranch { node_id: String, condition: String },
    /// A case edge carries no expression
    MissingCaseExpression { edge_id: String },
    /// No node qualifies as the traversal start
    NoEntryNode,
    /// More than one node qualifies as the traversal start
    MultipleEntryNodes { node_ids: Vec<String> },
}

impl fmt::Display for TopologyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNode { edge_id, node_id } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge_id, node_id)
            }
            Self::ForeignWorkflow { id, workflow_id } => {
                write!(f, "'{}' does not belong to workflow '{}'", id, workflow_id)
            }
            Self::DuplicateId { id } => write!(f, "Duplicate id '{}'", id),
            Self::GroupNotLoop { edge_id, group_id } => {
                write!(
                    f,
                    "Edge '{}' is grouped under '{}', which is not a loop node",
                    edge_id, group_id
                )
            }
            Self::ConditionNotAllowed {
                node_id,
                node_type,
                condition,
            } => {
                write!(
                    f,
                    "Node '{}' of type {} cannot have a '{}' edge",
                    node_id, node_type, condition
                )
            }
            Self::DuplicateCondition { node_id, condition } => {
                write!(f, "Node '{}' already has a '{}' edge", node_id, condition)
            }
            Self::TooManyOutgoing { node_id, max } => {
                write!(f, "Node '{}' allows at most {} outgoing edge(s)", node_id, max)
            }
            Self::DuplicateLoopEdge { node_id, kind } => {
                write!(f, "Loop '{}' already has a {} edge", node_id, kind)
            }
            Self::SelfPointingLoopBody { node_id } => {
                write!(f, "Loop '{}' subgraph-entry edge points at the loop itself", node_id)
            }
            Self::SelfLoop { node_id } => write!(f, "Node '{}' cannot connect to itself", node_id),
            Self::TooManyIncoming { node_id } => {
                write!(f, "Node '{}' already has an incoming edge", node_id)
            }
            Self::MissingBranch { node_id, condition } => {
                write!(f, "Node '{}' requires an '{}' edge", node_id, condition)
            }
            Self::MissingCaseExpression { edge_id } => {
                write!(f, "Case edge '{}' has no expression", edge_id)
            }
            Self::NoEntryNode => write!(f, "Workflow has no entry node"),
            Self::MultipleEntryNodes { node_ids } => {
                write!(f, "Workflow has multiple entry nodes: {}", node_ids.join(", "))
            }
        }
    }
}

impl std::error::Error for TopologyViolation {}

pub(crate) fn format_violations(violations: &[TopologyViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Turn collected violations into a `GraphTopology` error
pub fn ensure_valid(violations: Vec<TopologyViolation>) -> Result<()> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(EngineError::GraphTopology(violations))
    }
}

/// Check one new edge against the edges already present in `workflow`
pub fn validate_edge(workflow: &Workflow, edge: &Edge) -> Vec<TopologyViolation> {
    let mut errors = Vec::new();

    if edge.workflow_id != workflow.id {
        errors.push(TopologyViolation::ForeignWorkflow {
            id: edge.id.clone(),
            workflow_id: workflow.id.clone(),
        });
    }

    let source = workflow.find_node(&edge.source);
    let target = workflow.find_node(&edge.target);
    for (node, id) in [(source, &edge.source), (target, &edge.target)] {
        if node.is_none() {
            errors.push(TopologyViolation::UnknownNode {
                edge_id: edge.id.clone(),
                node_id: id.clone(),
            });
        }
    }
    let (Some(source), Some(target)) = (source, target) else {
        return errors;
    };

    if let Some(group_id) = &edge.group_id {
        let is_loop = workflow
            .find_node(group_id)
            .is_some_and(|n| n.node_type == NodeType::Loop);
        if !is_loop {
            errors.push(TopologyViolation::GroupNotLoop {
                edge_id: edge.id.clone(),
                group_id: group_id.clone(),
            });
        }
    }

    let existing: Vec<&Edge> = workflow
        .outgoing_edges(&source.id)
        .into_iter()
        .filter(|e| e.id != edge.id)
        .collect();

    if source.id == target.id && !edge.is_subgraph_entry() {
        errors.push(TopologyViolation::SelfLoop {
            node_id: source.id.clone(),
        });
    }

    let disallowed = |errors: &mut Vec<TopologyViolation>| {
        errors.push(TopologyViolation::ConditionNotAllowed {
            node_id: source.id.clone(),
            node_type: source.node_type,
            condition: edge.condition.label(),
        })
    };

    match (source.node_type, source.node_type.category()) {
        (NodeType::Conditional | NodeType::RuleExecutor, _) => {
            if !edge.condition.is_branch() {
                disallowed(&mut errors);
            } else if existing.iter().any(|e| e.condition == edge.condition) {
                errors.push(TopologyViolation::DuplicateCondition {
                    node_id: source.id.clone(),
                    condition: edge.condition.label(),
                });
            } else if existing.len() >= 2 {
                errors.push(TopologyViolation::TooManyOutgoing {
                    node_id: source.id.clone(),
                    max: 2,
                });
            }
        }
        (NodeType::Switch, _) => {
            if edge.condition.is_branch() {
                disallowed(&mut errors);
            } else if existing.iter().any(|e| e.condition == edge.condition) {
                errors.push(TopologyViolation::DuplicateCondition {
                    node_id: source.id.clone(),
                    condition: edge.condition.label(),
                });
            }
        }
        (NodeType::Loop, _) => {
            if edge.condition != EdgeCondition::None {
                disallowed(&mut errors);
            } else if edge.is_subgraph_entry() {
                if target.id == source.id {
                    errors.push(TopologyViolation::SelfPointingLoopBody {
                        node_id: source.id.clone(),
                    });
                } else if existing.iter().any(|e| e.is_subgraph_entry()) {
                    errors.push(TopologyViolation::DuplicateLoopEdge {
                        node_id: source.id.clone(),
                        kind: "subgraph-entry",
                    });
                }
            } else if existing.iter().any(|e| !e.is_subgraph_entry()) {
                errors.push(TopologyViolation::DuplicateLoopEdge {
                    node_id: source.id.clone(),
                    kind: "exit",
                });
            }
        }
        (_, NodeCategory::Action | NodeCategory::Transform) => {
            if edge.condition != EdgeCondition::None {
                disallowed(&mut errors);
            } else if !existing.is_empty() {
                errors.push(TopologyViolation::TooManyOutgoing {
                    node_id: source.id.clone(),
                    max: 1,
                });
            }
        }
        (_, NodeCategory::Flow) => {}
    }

    let incoming: Vec<&Edge> = workflow
        .incoming_edges(&target.id)
        .into_iter()
        .filter(|e| e.id != edge.id)
        .collect();
    let over_limit = if target.node_type == NodeType::Loop {
        // back-edges of its own body are unlimited, one edge from outside
        let is_back_edge = edge.group_id.as_deref() == Some(target.id.as_str());
        !is_back_edge
            && incoming
                .iter()
                .any(|e| e.group_id.as_deref() != Some(target.id.as_str()))
    } else {
        !incoming.is_empty()
    };
    if over_limit {
        errors.push(TopologyViolation::TooManyIncoming {
            node_id: target.id.clone(),
        });
    }

    errors
}

/// Validate a finished workflow
///
/// Returns all violations found (not just the first).
pub fn validate_workflow(workflow: &Workflow) -> Vec<TopologyViolation> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for node in &workflow.nodes {
        if !seen.insert(node.id.as_str()) {
            errors.push(TopologyViolation::DuplicateId { id: node.id.clone() });
        }
        if node.workflow_id != workflow.id {
            errors.push(TopologyViolation::ForeignWorkflow {
                id: node.id.clone(),
                workflow_id: workflow.id.clone(),
            });
        }
    }
    let mut seen_edges = HashSet::new();
    for edge in &workflow.edges {
        if !seen_edges.insert(edge.id.as_str()) {
            errors.push(TopologyViolation::DuplicateId { id: edge.id.clone() });
        }
    }

    // Replay edges in order so each is checked against its predecessors only
    let mut partial = Workflow {
        edges: Vec::with_capacity(workflow.edges.len()),
        ..workflow.clone()
    };
    for edge in &workflow.edges {
        errors.extend(validate_edge(&partial, edge));
        partial.edges.push(edge.clone());
    }

    validate_branches(workflow, &mut errors);
    validate_case_expressions(workflow, &mut errors);
    validate_entry(workflow, &mut errors);

    errors
}

fn validate_branches(workflow: &Workflow, errors: &mut Vec<TopologyViolation>) {
    for node in workflow.nodes.iter().filter(|n| n.node_type.is_branching()) {
        let outgoing = workflow.outgoing_edges(&node.id);
        for condition in [EdgeCondition::OnTrue, EdgeCondition::OnFalse] {
            if !outgoing.iter().any(|e| e.condition == condition) {
                errors.push(TopologyViolation::MissingBranch {
                    node_id: node.id.clone(),
                    condition: condition.label(),
                });
            }
        }
    }
}

fn validate_case_expressions(workflow: &Workflow, errors: &mut Vec<TopologyViolation>) {
    for edge in workflow.edges.iter().filter(|e| e.condition.is_case()) {
        let blank = edge.expression.as_deref().map_or(true, |x| x.trim().is_empty());
        if blank {
            errors.push(TopologyViolation::MissingCaseExpression {
                edge_id: edge.id.clone(),
            });
        }
    }
}

fn validate_entry(workflow: &Workflow, errors: &mut Vec<TopologyViolation>) {
    if workflow.nodes.is_empty() {
        return;
    }
    match workflow.entry_candidates().as_slice() {
        [] => errors.push(TopologyViolation::NoEntryNode),
        [_] => {}
        many => errors.push(TopologyViolation::MultipleEntryNodes {
            node_ids: many.iter().map(|n| n.id.clone()).collect(),
        }),
    }
}

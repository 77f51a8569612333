//! Error types for the switchyard engine

use thiserror::Error;

use crate::validation::{format_violations, TopologyViolation};

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while authoring or executing a workflow
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or malformed node configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An expression failed to parse, threw, or mismatched types
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// A leaf handler failed (I/O, remote service, bad payload)
    #[error("Handler error: {0}")]
    Handler(String),

    /// Every attempt of a retried action failed
    #[error("Retry exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        last: Box<EngineError>,
    },

    /// Code block exceeded its wall-clock limit
    #[error("Sandbox timeout after {0} ms")]
    SandboxTimeout(u64),

    /// Code block exceeded its memory limit
    #[error("Sandbox memory limit of {0} KB exceeded")]
    SandboxMemory(u64),

    /// An edge or graph violates the topology rules
    #[error("Graph topology error: {}", format_violations(.0))]
    GraphTopology(Vec<TopologyViolation>),

    /// Workflow id does not resolve
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Workflow exists but is switched off
    #[error("Workflow is disabled: {0}")]
    WorkflowDisabled(String),

    /// Node id does not resolve
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Switch node had no matching case and no fallback edge
    #[error("No matching case for switch node '{0}'")]
    NoMatchingCase(String),

    /// Graph or execution store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a configuration error with a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an evaluation error with a message
    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    /// Create a handler error with a message
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    /// Create a store error with a message
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Wrap a single topology violation
    pub fn topology(violation: TopologyViolation) -> Self {
        Self::GraphTopology(vec![violation])
    }

    /// Stable snake_case name of the error kind, recorded in failure logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Evaluation(_) => "evaluation_error",
            Self::Handler(_) => "handler_error",
            Self::RetryExhausted { .. } => "retry_exhausted_error",
            Self::SandboxTimeout(_) => "sandbox_timeout_error",
            Self::SandboxMemory(_) => "sandbox_memory_error",
            Self::GraphTopology(_) => "graph_topology_error",
            Self::WorkflowNotFound(_) => "workflow_not_found",
            Self::WorkflowDisabled(_) => "workflow_disabled",
            Self::NodeNotFound(_) => "node_not_found",
            Self::NoMatchingCase(_) => "no_matching_case",
            Self::Store(_) => "store_error",
            Self::Serialization(_) => "serialization_error",
            Self::Io(_) => "io_error",
        }
    }
}

//! Switchyard Engine - Graph traversal for workflow automation
//!
//! This crate runs workflows: directed graphs of typed nodes joined by
//! condition-tagged edges. It supports:
//!
//! - Conditional, rule-based and switch branching
//! - Fixed-count, for-each and while loops over scoped subgraphs
//! - Action retries with bounded attempts and delay
//! - An audit log of every node step, plus streamed run events
//!
//! # Architecture
//!
//! - `GraphStore` / `ExecutionStore`: persistence seams, in-memory by default
//! - `WorkflowExecutor`: walks one execution from the entry node to the end
//! - `HandlerRegistry`: leaf node types dispatched to `NodeHandler`s
//! - `EventSink`: generic event streaming
//!
//! Flow-control nodes (conditional, switch, loop) are interpreted by the
//! engine. Actions, the rule executor and transforms are supplied by the
//! `switchyard-nodes` crate or the embedding application.
//!
//! # Example
//!
//! ```ignore
//! use switchyard_engine::{Engine, EngineConfig, HandlerRegistry, WorkflowBuilder, NodeType};
//!
//! let engine = Engine::in_memory(HandlerRegistry::new(), EngineConfig::default());
//! let workflow = WorkflowBuilder::new("wf", "Hello")
//!     .node("greet", NodeType::Map, json!({"message": "hi {{ input.name }}"}))
//!     .build()?;
//! engine.graph().insert_workflow(workflow).await?;
//! let report = engine.trigger("wf", None, json!({"name": "ada"})).await?;
//! ```

pub mod builder;
pub mod config;
pub mod constants;
pub mod context;
pub mod control;
pub mod edges;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod expression;
pub mod node_config;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod sandbox;
pub mod store;
pub mod template;
pub mod types;
pub mod validation;

// Re-export key types
pub use builder::WorkflowBuilder;
pub use config::{EngineConfig, ExecutionSettings};
pub use context::{ExecutionState, Scope};
pub use engine::{Engine, ExecutionReport};
pub use error::{EngineError, Result};
pub use events::{EventError, EventSink, NullEventSink, VecEventSink, WorkflowEvent};
pub use executor::WorkflowExecutor;
pub use registry::{CallbackHandler, HandlerInput, HandlerRegistry, NodeHandler};
pub use retry::RetryPolicy;
pub use sandbox::{CodeExecutionResult, CodeSandbox, SandboxLimits};
pub use store::{
    ExecutionStore, GraphStore, InMemoryExecutionStore, InMemoryGraphStore, NodeLogEntry,
};
pub use types::{
    Edge, EdgeCondition, EdgeId, Execution, ExecutionId, ExecutionStatus, LogEvent, LogId, Node,
    NodeCategory, NodeExecutionLog, NodeId, NodeType, Workflow, WorkflowId,
};
pub use validation::TopologyViolation;

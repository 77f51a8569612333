//! Handler registry for leaf node types
//!
//! Conditional, switch and loop nodes are interpreted by the engine itself.
//! Every other node type is dispatched to a [`NodeHandler`] registered here
//! under its [`NodeType`].
//!
//! # Usage
//!
//! ```ignore
//! use switchyard_engine::{HandlerRegistry, NodeType};
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_callback(NodeType::Map, |input| async move {
//!     Ok(input.previous_output.unwrap_or_default())
//! })?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::template::resolve_template;
use crate::types::{ExecutionId, Node, NodeId, NodeType};

/// Everything a handler sees for one invocation
#[derive(Debug, Clone)]
pub struct HandlerInput {
    pub node: Node,
    /// Merged context view, including `previous`
    pub context: Value,
    /// Result of the node that ran immediately before, in the same scope
    pub previous_output: Option<Value>,
    /// Loop whose body is running, if any
    pub group_id: Option<NodeId>,
    pub execution_id: ExecutionId,
}

impl HandlerInput {
    /// Node config with every `{{ }}` placeholder resolved against the context
    pub fn resolved_config(&self, strict: bool) -> Result<Value> {
        resolve_template(&self.node.config, &self.context, strict)
    }

    /// Raw config field, before template resolution
    pub fn config_field(&self, key: &str) -> Option<&Value> {
        self.node.config.get(key)
    }
}

/// Executes exactly one leaf node type
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn handle(&self, input: HandlerInput) -> Result<Value>;
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Async closure wrapped as a handler
pub struct CallbackHandler {
    callback: Box<dyn Fn(HandlerInput) -> HandlerFuture + Send + Sync>,
}

impl CallbackHandler {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(HandlerInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            callback: Box::new(move |input| Box::pin(callback(input))),
        }
    }
}

#[async_trait]
impl NodeHandler for CallbackHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value> {
        (self.callback)(input).await
    }
}

/// Registry of leaf handlers keyed by node type
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a leaf node type, replacing any previous one.
    ///
    /// Engine-owned types (conditional, switch, loop) cannot be overridden.
    pub fn register(&mut self, node_type: NodeType, handler: Arc<dyn NodeHandler>) -> Result<()> {
        if node_type.is_engine_owned() {
            return Err(EngineError::config(format!(
                "node type '{}' is executed by the engine and takes no handler",
                node_type
            )));
        }
        if self.handlers.insert(node_type, handler).is_some() {
            log::debug!("Replaced handler for node type '{}'", node_type);
        }
        Ok(())
    }

    /// Register an async closure as the handler for `node_type`
    pub fn register_callback<F, Fut>(&mut self, node_type: NodeType, callback: F) -> Result<()>
    where
        F: Fn(HandlerInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register(node_type, Arc::new(CallbackHandler::new(callback)))
    }

    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(&node_type).cloned()
    }

    pub fn has_handler(&self, node_type: NodeType) -> bool {
        self.handlers.contains_key(&node_type)
    }

    /// Registered node types in declaration order
    pub fn node_types(&self) -> Vec<NodeType> {
        let mut types: Vec<NodeType> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    /// Leaf node types with no registered handler
    pub fn missing(&self) -> Vec<NodeType> {
        NodeType::ALL
            .into_iter()
            .filter(|t| !t.is_engine_owned() && !self.has_handler(*t))
            .collect()
    }

    /// Merge another registry into this one
    ///
    /// Handlers from `other` override handlers in `self` for the same node type.
    pub fn merge(&mut self, other: HandlerRegistry) {
        self.handlers.extend(other.handlers);
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("node_types", &self.node_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(node_type: NodeType, config: Value) -> HandlerInput {
        HandlerInput {
            node: Node::new("n1", "wf", node_type, config),
            context: json!({"input": {"name": "Ada"}, "name": "Ada", "output": {}}),
            previous_output: Some(json!({"value": 1})),
            group_id: None,
            execution_id: "exec1".into(),
        }
    }

    #[tokio::test]
    async fn test_register_with_callback() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_callback(NodeType::Map, |input| async move {
                Ok(json!({"echo": input.previous_output}))
            })
            .unwrap();

        assert!(registry.has_handler(NodeType::Map));
        let handler = registry.get(NodeType::Map).unwrap();
        let result = handler.handle(input(NodeType::Map, json!({}))).await.unwrap();
        assert_eq!(result, json!({"echo": {"value": 1}}));
    }

    #[test]
    fn test_engine_owned_types_rejected() {
        let mut registry = HandlerRegistry::new();
        for node_type in [NodeType::Conditional, NodeType::Switch, NodeType::Loop] {
            let err = registry
                .register_callback(node_type, |_| async { Ok(Value::Null) })
                .unwrap_err();
            assert!(matches!(err, EngineError::Configuration(_)));
        }
        assert!(registry.node_types().is_empty());
    }

    #[test]
    fn test_merge_override() {
        let mut first = HandlerRegistry::new();
        first.register_callback(NodeType::Map, |_| async { Ok(json!(1)) }).unwrap();

        let mut second = HandlerRegistry::new();
        second.register_callback(NodeType::Map, |_| async { Ok(json!(2)) }).unwrap();
        second.register_callback(NodeType::Split, |_| async { Ok(json!(3)) }).unwrap();

        first.merge(second);
        assert_eq!(first.node_types(), vec![NodeType::Map, NodeType::Split]);

        let handler = first.get(NodeType::Map).unwrap();
        let result = tokio_test::block_on(handler.handle(input(NodeType::Map, json!({})))).unwrap();
        assert_eq!(result, json!(2));
    }

    #[test]
    fn test_missing_lists_unregistered_leaf_types() {
        let mut registry = HandlerRegistry::new();
        registry.register_callback(NodeType::Map, |_| async { Ok(Value::Null) }).unwrap();
        let missing = registry.missing();
        assert!(!missing.contains(&NodeType::Map));
        assert!(!missing.contains(&NodeType::Loop));
        assert!(missing.contains(&NodeType::SendEmail));
    }

    #[test]
    fn test_resolved_config() {
        let input = input(NodeType::Map, json!({"greeting": "Hi {{ name }}"}));
        assert_eq!(input.resolved_config(true).unwrap(), json!({"greeting": "Hi Ada"}));
        assert_eq!(input.config_field("greeting"), Some(&json!("Hi {{ name }}")));
    }
}

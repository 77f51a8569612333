//! Switchyard Nodes
//!
//! Leaf node handlers for the Switchyard workflow engine. Flow control
//! (conditional, switch, loop) lives in the engine; every other node type is
//! implemented here as a [`NodeHandler`](switchyard_engine::NodeHandler).
//!
//! # Categories
//!
//! - **Action**: outbound side effects (HTTP, email, database), retried per node
//! - **Rules**: remote ruleset evaluation feeding an `on_true`/`on_false` branch
//! - **Transform**: pure reshaping of the previous node's output
//! - **Code**: user source run in a resource-limited child process

pub mod action;
pub mod code;
pub mod data;
pub mod rules;
pub mod setup;
pub mod transform;

pub use action::{
    Database, EmailHandler, EmailMessage, HttpMailer, HttpRequestHandler, InMemoryDatabase,
    Mailer, UpdateDatabaseHandler,
};
pub use code::{CodeBlockHandler, Language, ProcessSandbox};
pub use rules::{HttpRuleEvaluator, RuleEvaluation, RuleEvaluator, RuleExecutorHandler};
pub use setup::{builtin_registry, register_builtin_handlers, Builtins};
pub use transform::TransformHandler;

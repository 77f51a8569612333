//! Flow-control nodes interpreted by the engine
//!
//! Conditional and switch evaluation are pure functions of the context view.
//! Loops drive their body back through the node runner.

pub mod conditional;
pub mod loops;
pub mod switch;

use serde::Serialize;
use serde_json::Value;

/// One evaluated expression as recorded in a node's output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionOutcome {
    /// Expression after placeholder substitution
    pub expression: String,
    pub success: bool,
    pub matched_value: Value,
}

//! Sandboxed expression language
//!
//! Conditions, switch cases, loop exit conditions and formulas are parsed
//! into a small AST and evaluated against the context view. Supported:
//! literals, arrays, objects, `$.path` / `$name` / bare references, member and
//! index access, `! -` prefixes, arithmetic, comparisons, loose and strict
//! equality, `&&` / `||`, and the whitelisted functions in [`functions`].

mod eval;
pub mod functions;
mod lexer;
mod parser;

use serde::Serialize;
use serde_json::Value;

pub use eval::{is_truthy, loose_eq, number, strict_eq, to_number, to_text, type_name, Evaluator};
pub use parser::{parse, BinaryOp, Expr, UnaryOp};

use crate::error::Result;

/// Outcome of evaluating one expression
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// Truthiness of `value`
    pub matched: bool,
    pub value: Value,
}

/// Parse and evaluate `source` against `context`
pub fn evaluate(source: &str, context: &Value) -> Result<Evaluation> {
    let expr = parse(source)?;
    let value = Evaluator::new(context).eval(&expr)?;
    Ok(Evaluation {
        matched: is_truthy(&value),
        value,
    })
}

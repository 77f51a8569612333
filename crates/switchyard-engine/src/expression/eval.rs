//! AST evaluator
//!
//! Evaluates against a read-only JSON context. Nothing here reaches the
//! host: the only callable names are the whitelisted functions.

use serde_json::{Map, Value};

use super::functions;
use super::parser::{BinaryOp, Expr, UnaryOp};
use crate::constants::expression::MAX_DEPTH;
use crate::error::{EngineError, Result};

/// Build a JSON number, keeping integral values integral
pub fn number(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// JavaScript-style truthiness
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Numeric coercion used by arithmetic and ordering
pub fn to_number(value: &Value) -> Result<f64> {
    match value {
        Value::Null => Ok(0.0),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| EngineError::evaluation("number out of range")),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(0.0);
            }
            trimmed
                .parse::<f64>()
                .map_err(|_| EngineError::evaluation(format!("cannot use '{}' as a number", s)))
        }
        Value::Array(_) | Value::Object(_) => Err(EngineError::evaluation(format!(
            "cannot use {} as a number",
            type_name(value)
        ))),
    }
}

/// String coercion used by concatenation and string functions
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `==`: numbers, numeric strings and booleans compare by value
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(_) | Value::Bool(_) | Value::String(_), Value::Number(_) | Value::Bool(_) | Value::String(_)) => {
            match (to_number(left), to_number(right)) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            }
        }
        (a, b) => a == b,
    }
}

/// `===`: same type and same value, numbers compared numerically
pub fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

/// Evaluator bound to one context value
pub struct Evaluator<'a> {
    context: &'a Value,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(context: &'a Value) -> Self {
        Self { context, depth: 0 }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EngineError::evaluation(format!(
                "evaluation exceeds depth {}",
                MAX_DEPTH
            )));
        }
        let result = self.eval_inner(expr);
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Expr::Object(fields) => {
                let mut map = Map::new();
                for (key, value) in fields {
                    map.insert(key.clone(), self.eval(value)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Root => Ok(self.context.clone()),
            Expr::Variable(name) => self
                .context
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::evaluation(format!("unknown identifier '{}'", name))),
            Expr::Member(target, key) => {
                let target = self.eval(target)?;
                Ok(member(&target, key))
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                Ok(match (&target, &index) {
                    (Value::Array(items), Value::Number(n)) => n
                        .as_u64()
                        .and_then(|i| items.get(i as usize).cloned())
                        .unwrap_or(Value::Null),
                    (_, key) => member(&target, &to_text(key)),
                })
            }
            Expr::Unary(UnaryOp::Not, operand) => {
                let value = self.eval(operand)?;
                Ok(Value::Bool(!is_truthy(&value)))
            }
            Expr::Unary(UnaryOp::Negate, operand) => {
                let value = self.eval(operand)?;
                Ok(number(-to_number(&value)?))
            }
            Expr::Binary(BinaryOp::And, left, right) => {
                let left = self.eval(left)?;
                if is_truthy(&left) {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                let left = self.eval(left)?;
                if is_truthy(&left) {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                functions::call(name, args)
            }
        }
    }
}

fn member(target: &Value, key: &str) -> Value {
    match target {
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
        Value::Array(items) if key == "length" => Value::from(items.len()),
        Value::Array(items) => key
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null),
        Value::String(s) if key == "length" => Value::from(s.chars().count()),
        _ => Value::Null,
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::NotEq => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::StrictEq => Ok(Value::Bool(strict_eq(left, right))),
        BinaryOp::StrictNotEq => Ok(Value::Bool(!strict_eq(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, left, right),
        BinaryOp::Add => {
            if left.is_string() || right.is_string() {
                Ok(Value::String(format!("{}{}", to_text(left), to_text(right))))
            } else {
                Ok(number(to_number(left)? + to_number(right)?))
            }
        }
        BinaryOp::Sub => Ok(number(to_number(left)? - to_number(right)?)),
        BinaryOp::Mul => Ok(number(to_number(left)? * to_number(right)?)),
        BinaryOp::Div | BinaryOp::Mod => {
            let divisor = to_number(right)?;
            if divisor == 0.0 {
                return Err(EngineError::evaluation("division by zero"));
            }
            let dividend = to_number(left)?;
            Ok(number(if op == BinaryOp::Div {
                dividend / divisor
            } else {
                dividend % divisor
            }))
        }
        BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(if op == BinaryOp::And {
            is_truthy(left) && is_truthy(right)
        } else {
            is_truthy(left) || is_truthy(right)
        })),
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),
        _ => to_number(left)?.partial_cmp(&to_number(right)?),
    };
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    Ok(Value::Bool(match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parse;
    use serde_json::json;

    fn eval(source: &str, context: &Value) -> Result<Value> {
        let expr = parse(source)?;
        Evaluator::new(context).eval(&expr)
    }

    #[test]
    fn test_arithmetic_keeps_integers() {
        let ctx = json!({});
        assert_eq!(eval("1 + 2 * 3", &ctx).unwrap(), json!(7));
        assert_eq!(eval("7 / 2", &ctx).unwrap(), json!(3.5));
        assert_eq!(eval("-(2 - 5)", &ctx).unwrap(), json!(3));
        assert_eq!(eval("10 % 4", &ctx).unwrap(), json!(2));
        assert!(eval("1 / 0", &ctx).is_err());
    }

    #[test]
    fn test_loose_and_strict_equality() {
        let ctx = json!({"code": 200, "label": "200"});
        assert_eq!(eval("code == label", &ctx).unwrap(), json!(true));
        assert_eq!(eval("code === label", &ctx).unwrap(), json!(false));
        assert_eq!(eval("code === 200.0", &ctx).unwrap(), json!(true));
        assert_eq!(eval("null == 0", &ctx).unwrap(), json!(false));
        assert_eq!(eval("[1, 2] == [1, 2]", &ctx).unwrap(), json!(true));
    }

    #[test]
    fn test_paths_into_context() {
        let ctx = json!({
            "output": {"A": {"response_code": 200, "items": [{"id": 7}]}},
            "$index": 2
        });
        assert_eq!(eval("$.output.A.response_code", &ctx).unwrap(), json!(200));
        assert_eq!(eval("$.output.A.items[0].id", &ctx).unwrap(), json!(7));
        assert_eq!(eval("$.output.A.items.length", &ctx).unwrap(), json!(1));
        assert_eq!(eval("$.output.missing.deeper", &ctx).unwrap(), Value::Null);
        assert_eq!(eval("$index + 1", &ctx).unwrap(), json!(3));
        assert!(eval("nope", &ctx).is_err());
    }

    #[test]
    fn test_logical_short_circuit() {
        let ctx = json!({"flag": false});
        // the right side would fail on an unknown identifier
        assert_eq!(eval("flag && undefinedThing", &ctx).unwrap(), json!(false));
        assert_eq!(eval("!flag || undefinedThing", &ctx).unwrap(), json!(true));
        assert_eq!(eval("null || 'fallback'", &ctx).unwrap(), json!("fallback"));
    }

    #[test]
    fn test_comparison_rules() {
        let ctx = json!({});
        assert_eq!(eval("'apple' < 'banana'", &ctx).unwrap(), json!(true));
        assert_eq!(eval("'10' > 9", &ctx).unwrap(), json!(true));
        assert!(eval("[1] < 2", &ctx).is_err());
        assert!(eval("'abc' > 1", &ctx).is_err());
    }

    #[test]
    fn test_string_concatenation() {
        let ctx = json!({"name": "Ada"});
        assert_eq!(eval("'hi ' + name + 1", &ctx).unwrap(), json!("hi Ada1"));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!("0")));
    }
}

//! Whitelisted functions callable from expressions and templates
//!
//! Names are matched case-insensitively. Anything not listed here is an
//! evaluation error.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::eval::{is_truthy, number, to_number, to_text, type_name};
use crate::error::{EngineError, Result};

pub const FUNCTION_NAMES: &[&str] = &[
    "lower", "upper", "capitalize", "startcase", "concat", "trim", "substr", "replace",
    "length", "abs", "round", "min", "max", "sum", "avg", "ceil", "floor", "trunc", "median",
    "sqrt", "pow", "mod", "now", "timestamp", "cond", "coalesce", "tonumber", "tostring",
    "toboolean", "size", "keys", "values", "jsonparse", "jsonstringify", "contains",
    "startswith", "endswith",
];

pub fn is_known(name: &str) -> bool {
    FUNCTION_NAMES.contains(&name.to_ascii_lowercase().as_str())
}

pub fn call(name: &str, args: Vec<Value>) -> Result<Value> {
    let lowered = name.to_ascii_lowercase();
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);

    match lowered.as_str() {
        "lower" => Ok(Value::String(to_text(&arg(0)).to_lowercase())),
        "upper" => Ok(Value::String(to_text(&arg(0)).to_uppercase())),
        "capitalize" => Ok(Value::String(capitalize(&to_text(&arg(0)).to_lowercase()))),
        "startcase" => Ok(Value::String(start_case(&to_text(&arg(0))))),
        "concat" => Ok(Value::String(args.iter().map(to_text).collect())),
        "trim" => Ok(Value::String(to_text(&arg(0)).trim().to_string())),
        "substr" => {
            let text: Vec<char> = to_text(&arg(0)).chars().collect();
            let start = clamp_index(to_number(&arg(1))?, text.len());
            let end = match args.get(2) {
                Some(len) => start.saturating_add(to_number(len)?.max(0.0) as usize).min(text.len()),
                None => text.len(),
            };
            Ok(Value::String(text[start..end].iter().collect()))
        }
        "replace" => Ok(Value::String(
            to_text(&arg(0)).replace(&to_text(&arg(1)), &to_text(&arg(2))),
        )),
        "length" | "size" => Ok(Value::from(match &arg(0) {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            Value::Null => 0,
            other => to_text(other).chars().count(),
        })),
        "abs" => Ok(number(to_number(&arg(0))?.abs())),
        "round" => {
            let value = to_number(&arg(0))?;
            let digits = match args.get(1) {
                Some(d) => to_number(d)?,
                None => 0.0,
            };
            let factor = 10f64.powi(digits as i32);
            Ok(number((value * factor).round() / factor))
        }
        "ceil" => Ok(number(to_number(&arg(0))?.ceil())),
        "floor" => Ok(number(to_number(&arg(0))?.floor())),
        "trunc" => Ok(number(to_number(&arg(0))?.trunc())),
        "sqrt" => {
            let value = to_number(&arg(0))?;
            if value < 0.0 {
                return Err(EngineError::evaluation("sqrt of a negative number"));
            }
            Ok(number(value.sqrt()))
        }
        "pow" => Ok(number(to_number(&arg(0))?.powf(to_number(&arg(1))?))),
        "mod" => {
            let divisor = to_number(&arg(1))?;
            if divisor == 0.0 {
                return Err(EngineError::evaluation("mod by zero"));
            }
            Ok(number(to_number(&arg(0))? % divisor))
        }
        "min" | "max" | "sum" | "avg" | "median" => {
            let values = numeric_args(&args)?;
            if values.is_empty() {
                return Ok(if lowered == "sum" { Value::from(0) } else { Value::Null });
            }
            Ok(number(match lowered.as_str() {
                "min" => values.iter().copied().fold(f64::INFINITY, f64::min),
                "max" => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                "sum" => values.iter().sum(),
                "avg" => values.iter().sum::<f64>() / values.len() as f64,
                _ => median(values),
            }))
        }
        "now" => Ok(Value::String(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true))),
        "timestamp" => match args.first() {
            None | Some(Value::Null) => Ok(Value::from(Utc::now().timestamp_millis())),
            Some(Value::Number(n)) => Ok(Value::Number(n.clone())),
            Some(other) => {
                let text = to_text(other);
                let parsed = DateTime::parse_from_rfc3339(&text)
                    .map_err(|_| EngineError::evaluation(format!("invalid date '{}'", text)))?;
                Ok(Value::from(parsed.timestamp_millis()))
            }
        },
        "cond" => Ok(if is_truthy(&arg(0)) { arg(1) } else { arg(2) }),
        "coalesce" => Ok(args
            .into_iter()
            .find(|v| !v.is_null() && v.as_str() != Some(""))
            .unwrap_or(Value::Null)),
        "tonumber" => Ok(number(to_number(&arg(0))?)),
        "tostring" => Ok(Value::String(to_text(&arg(0)))),
        "toboolean" => Ok(Value::Bool(match &arg(0) {
            Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
            other => is_truthy(other),
        })),
        "keys" => match arg(0) {
            Value::Object(map) => Ok(Value::Array(map.keys().cloned().map(Value::String).collect())),
            other => Err(type_error("keys", "object", &other)),
        },
        "values" => match arg(0) {
            Value::Object(map) => Ok(Value::Array(map.values().cloned().collect())),
            other => Err(type_error("values", "object", &other)),
        },
        "jsonparse" => serde_json::from_str(&to_text(&arg(0)))
            .map_err(|e| EngineError::evaluation(format!("jsonParse: {}", e))),
        "jsonstringify" => Ok(Value::String(arg(0).to_string())),
        "contains" => Ok(Value::Bool(match (&arg(0), &arg(1)) {
            (Value::Array(items), needle) => items.contains(needle),
            (Value::Null, _) => false,
            (haystack, needle) => to_text(haystack).contains(&to_text(needle)),
        })),
        "startswith" => Ok(Value::Bool(
            !arg(0).is_null() && to_text(&arg(0)).starts_with(&to_text(&arg(1))),
        )),
        "endswith" => Ok(Value::Bool(
            !arg(0).is_null() && to_text(&arg(0)).ends_with(&to_text(&arg(1))),
        )),
        _ => Err(EngineError::evaluation(format!("function '{}' is not allowed", name))),
    }
}

fn type_error(function: &str, expected: &str, got: &Value) -> EngineError {
    EngineError::evaluation(format!(
        "{} expects {}, got {}",
        function,
        expected,
        type_name(got)
    ))
}

fn numeric_args(args: &[Value]) -> Result<Vec<f64>> {
    let flattened: Vec<&Value> = match args {
        [Value::Array(items)] => items.iter().collect(),
        _ => args.iter().collect(),
    };
    flattened
        .into_iter()
        .filter(|v| !v.is_null())
        .map(to_number)
        .collect()
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn clamp_index(raw: f64, len: usize) -> usize {
    if raw < 0.0 {
        len.saturating_sub((-raw) as usize)
    } else {
        (raw as usize).min(len)
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// "hello_world-fooBar" -> "Hello World Foo Bar"
fn start_case(text: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in text.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|w| capitalize(w))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_functions() {
        assert_eq!(call("upper", vec![json!("abc")]).unwrap(), json!("ABC"));
        assert_eq!(call("CAPITALIZE", vec![json!("hELLO")]).unwrap(), json!("Hello"));
        assert_eq!(call("startCase", vec![json!("hello_world-fooBar")]).unwrap(), json!("Hello World Foo Bar"));
        assert_eq!(call("substr", vec![json!("workflow"), json!(4), json!(3)]).unwrap(), json!("flo"));
        assert_eq!(call("substr", vec![json!("workflow"), json!(-4)]).unwrap(), json!("flow"));
        assert_eq!(call("substr", vec![json!("abc"), json!(1), json!(1e23)]).unwrap(), json!("bc"));
        assert_eq!(call("substr", vec![json!("abc"), json!(5), json!(2)]).unwrap(), json!(""));
        assert_eq!(call("substr", vec![json!("abc"), json!(1), json!(-3)]).unwrap(), json!(""));
        assert_eq!(call("replace", vec![json!("a-b-c"), json!("-"), json!("+")]).unwrap(), json!("a+b+c"));
        assert_eq!(call("concat", vec![json!("a"), json!(1), Value::Null]).unwrap(), json!("a1"));
    }

    #[test]
    fn test_numeric_functions() {
        assert_eq!(call("max", vec![json!([3, 9, 4])]).unwrap(), json!(9));
        assert_eq!(call("min", vec![json!(3), json!(-1)]).unwrap(), json!(-1));
        assert_eq!(call("avg", vec![json!([1, 2, 3, 4])]).unwrap(), json!(2.5));
        assert_eq!(call("median", vec![json!([5, 1, 3])]).unwrap(), json!(3));
        assert_eq!(call("round", vec![json!(2.456), json!(2)]).unwrap(), json!(2.46));
        assert_eq!(call("sum", vec![json!([])]).unwrap(), json!(0));
        assert!(call("sqrt", vec![json!(-4)]).is_err());
    }

    #[test]
    fn test_collection_and_conversion_functions() {
        assert_eq!(call("keys", vec![json!({"a": 1, "b": 2})]).unwrap(), json!(["a", "b"]));
        assert_eq!(call("size", vec![json!({"a": 1})]).unwrap(), json!(1));
        assert_eq!(call("toNumber", vec![json!("42")]).unwrap(), json!(42));
        assert_eq!(call("toBoolean", vec![json!("TRUE")]).unwrap(), json!(true));
        assert_eq!(call("coalesce", vec![Value::Null, json!(""), json!("x")]).unwrap(), json!("x"));
        assert_eq!(call("jsonParse", vec![json!("{\"a\":[1]}")]).unwrap(), json!({"a": [1]}));
        assert_eq!(call("contains", vec![json!(["x", "y"]), json!("y")]).unwrap(), json!(true));
        assert_eq!(call("timestamp", vec![json!("1970-01-01T00:00:01Z")]).unwrap(), json!(1000));
        assert!(call("keys", vec![json!(5)]).is_err());
    }

    #[test]
    fn test_unknown_function_rejected() {
        assert!(call("eval", vec![json!("1")]).is_err());
        assert!(call("random", vec![]).is_err());
        assert!(is_known("toString"));
        assert!(!is_known("require"));
    }
}

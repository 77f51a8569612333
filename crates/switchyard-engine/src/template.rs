//! `{{ }}` template resolution
//!
//! A placeholder holds either a dot path into the context (`$.output.A.code`,
//! `$index`, `input.name`) or an expression, typically a whitelisted function
//! call such as `{{ upper($.input.name) }}`.
//!
//! A string that is exactly one placeholder resolves to the referenced value
//! with its JSON type intact. Placeholders embedded in surrounding text are
//! stringified in place. Strings without placeholders are returned untouched.

use serde_json::{Map, Value};

use crate::error::{EngineError, Result};
use crate::expression::{self, to_text};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Resolve every placeholder inside `value`, recursing through arrays and objects.
///
/// In strict mode a path that does not resolve is an error; otherwise it
/// resolves to `null`.
pub fn resolve_template(value: &Value, context: &Value, strict: bool) -> Result<Value> {
    match value {
        Value::String(text) => resolve_str(text, context, strict),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_template(item, context, strict))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = Map::new();
            for (key, item) in map {
                resolved.insert(key.clone(), resolve_template(item, context, strict)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve placeholders in a single string
pub fn resolve_str(text: &str, context: &Value, strict: bool) -> Result<Value> {
    let segments = split_placeholders(text)?;
    match segments.as_slice() {
        [] => Ok(Value::String(String::new())),
        [Segment::Text(_)] => Ok(Value::String(text.to_string())),
        [Segment::Placeholder(inner)] if text.trim() == format!("{}{}{}", OPEN, inner, CLOSE) => {
            resolve_placeholder(inner, context, strict)
        }
        _ => {
            let mut out = String::with_capacity(text.len());
            for segment in &segments {
                match segment {
                    Segment::Text(t) => out.push_str(t),
                    Segment::Placeholder(inner) => {
                        out.push_str(&to_text(&resolve_placeholder(inner, context, strict)?))
                    }
                }
            }
            Ok(Value::String(out))
        }
    }
}

/// Substitute placeholders with their JSON encoding so the result can be
/// handed to the expression evaluator with types preserved.
///
/// `{{ $.output.A.status }} == 'ok'` with status `"ok"` becomes `"ok" == 'ok'`.
pub fn resolve_expression_source(source: &str, context: &Value) -> Result<String> {
    let segments = split_placeholders(source)?;
    let mut out = String::with_capacity(source.len());
    for segment in &segments {
        match segment {
            Segment::Text(t) => out.push_str(t),
            Segment::Placeholder(inner) => {
                let value = resolve_placeholder(inner, context, false)?;
                out.push_str(&serde_json::to_string(&value)?);
            }
        }
    }
    Ok(out)
}

/// True when `text` contains at least one placeholder
pub fn has_placeholders(text: &str) -> bool {
    text.find(OPEN)
        .is_some_and(|start| text[start + OPEN.len()..].contains(CLOSE))
}

/// Follow a dot path through `context`.
///
/// `$.a.b`, `a.b` and `a[0].b` are accepted; `$` alone is the whole context.
pub fn lookup_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path == "$" {
        return Some(context);
    }
    let path = path.strip_prefix("$.").unwrap_or(path);

    let mut current = context;
    for segment in path_segments(path) {
        current = match current {
            Value::Object(map) => map.get(segment.as_str())?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at a dot path, creating intermediate objects
pub fn set_path(target: &mut Value, path: &str, value: Value) {
    let segments = path_segments(path.strip_prefix("$.").unwrap_or(path));
    let Some((last, parents)) = segments.split_last() else {
        *target = value;
        return;
    };

    let mut current = target;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.clone(), value);
    }
}

/// Remove the value at a dot path, returning it
pub fn remove_path(target: &mut Value, path: &str) -> Option<Value> {
    let segments = path_segments(path.strip_prefix("$.").unwrap_or(path));
    let (last, parents) = segments.split_last()?;
    let mut current = target;
    for segment in parents {
        current = current.as_object_mut()?.get_mut(segment.as_str())?;
    }
    current.as_object_mut()?.remove(last.as_str())
}

fn path_segments(path: &str) -> Vec<String> {
    path.replace('[', ".")
        .replace(']', "")
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Dot paths are resolved by lookup, anything else is an expression
fn is_path(expr: &str) -> bool {
    if expr == "$" {
        return true;
    }
    let (body, allow_dash) = match expr.strip_prefix("$.") {
        Some(rest) => (rest, true),
        None => (expr, false),
    };
    if body.is_empty() {
        return false;
    }
    let first = body.chars().next().unwrap_or(' ');
    if !(first.is_alphabetic() || first == '_' || first == '$' || (allow_dash && first.is_alphanumeric())) {
        return false;
    }
    body.chars().all(|c| {
        c.is_alphanumeric() || matches!(c, '_' | '$' | '.' | '[' | ']') || (allow_dash && c == '-')
    })
}

fn resolve_placeholder(inner: &str, context: &Value, strict: bool) -> Result<Value> {
    let expr = inner.trim();
    if expr.is_empty() {
        return Err(EngineError::evaluation("empty template placeholder"));
    }

    if is_path(expr) {
        return match lookup_path(context, expr) {
            Some(value) => Ok(value.clone()),
            None if strict => Err(EngineError::evaluation(format!(
                "unresolved template path '{}'",
                expr
            ))),
            None => Ok(Value::Null),
        };
    }

    Ok(expression::evaluate(expr, context)?.value)
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

fn split_placeholders(text: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            return Err(EngineError::evaluation(format!(
                "unterminated placeholder in '{}'",
                text
            )));
        };
        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }
        segments.push(Segment::Placeholder(&after_open[..end]));
        rest = &after_open[end + CLOSE.len()..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "name": "Ada",
            "input": {"name": "Ada", "tags": ["x", "y"]},
            "output": {
                "A": {"response_code": 200, "body": {"ok": true}},
                "3f2a-b1": {"value": 1}
            },
            "$index": 2
        })
    }

    #[test]
    fn test_plain_string_unchanged() {
        assert_eq!(
            resolve_template(&json!("plain string"), &ctx(), false).unwrap(),
            json!("plain string")
        );
        assert_eq!(resolve_template(&json!(42), &ctx(), true).unwrap(), json!(42));
    }

    #[test]
    fn test_whole_placeholder_keeps_type() {
        let c = ctx();
        assert_eq!(resolve_str("{{ $.output.A.response_code }}", &c, true).unwrap(), json!(200));
        assert_eq!(resolve_str("{{$.output.A.body}}", &c, true).unwrap(), json!({"ok": true}));
        assert_eq!(resolve_str("{{ $index }}", &c, true).unwrap(), json!(2));
        assert_eq!(resolve_str("{{ input.tags[1] }}", &c, true).unwrap(), json!("y"));
        assert_eq!(resolve_str("{{ $.output.3f2a-b1.value }}", &c, true).unwrap(), json!(1));
    }

    #[test]
    fn test_embedded_placeholders_stringify() {
        let c = ctx();
        assert_eq!(
            resolve_str("Hi {{ name }}, code {{ $.output.A.response_code }}", &c, false).unwrap(),
            json!("Hi Ada, code 200")
        );
        assert_eq!(resolve_str("[{{ $.missing }}]", &c, false).unwrap(), json!("[]"));
    }

    #[test]
    fn test_strict_mode_rejects_missing_paths() {
        let c = ctx();
        assert!(resolve_str("{{ $.output.Z.value }}", &c, true).is_err());
        assert_eq!(resolve_str("{{ $.output.Z.value }}", &c, false).unwrap(), Value::Null);
    }

    #[test]
    fn test_function_calls_in_placeholders() {
        let c = ctx();
        assert_eq!(resolve_str("{{ upper($.input.name) }}", &c, true).unwrap(), json!("ADA"));
        assert_eq!(
            resolve_str("{{ concat(lower(name), '-', size(input.tags)) }}", &c, true).unwrap(),
            json!("ada-2")
        );
    }

    #[test]
    fn test_nested_structures() {
        let config = json!({"url": "http://x/{{ name }}", "body": {"code": "{{ $.output.A.response_code }}"}});
        let resolved = resolve_template(&config, &ctx(), true).unwrap();
        assert_eq!(resolved, json!({"url": "http://x/Ada", "body": {"code": 200}}));
    }

    #[test]
    fn test_expression_source_is_json_encoded() {
        let source = "{{ $.output.A.response_code }} == 200 && {{ name }} == 'Ada'";
        assert_eq!(
            resolve_expression_source(source, &ctx()).unwrap(),
            "200 == 200 && \"Ada\" == 'Ada'"
        );
    }

    #[test]
    fn test_unterminated_placeholder() {
        assert!(resolve_str("{{ name", &ctx(), false).is_err());
        assert!(!has_placeholders("{{ name"));
        assert!(has_placeholders("a {{ b }}"));
    }

    #[test]
    fn test_set_and_remove_path() {
        let mut target = json!({"a": 1});
        set_path(&mut target, "b.c", json!(2));
        set_path(&mut target, "a.d", json!(3));
        assert_eq!(target, json!({"a": {"d": 3}, "b": {"c": 2}}));
        assert_eq!(remove_path(&mut target, "b.c"), Some(json!(2)));
        assert_eq!(target, json!({"a": {"d": 3}, "b": {}}));
        assert_eq!(remove_path(&mut target, "x.y"), None);
    }
}

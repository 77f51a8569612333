//! Field-level transforms on objects (and arrays of objects)

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use switchyard_engine::expression::{is_truthy, number, to_number, to_text};
use switchyard_engine::template::{lookup_path, remove_path, set_path};
use switchyard_engine::{EngineError, NodeType, Result};

use super::date::parse_date;
use crate::data::{map_each, parse_rules, OneOrMany};

#[derive(Debug, Deserialize)]
struct MapRule {
    source: String,
    target: String,
}

#[derive(Debug, Deserialize)]
struct MapRules {
    #[serde(default, alias = "rules", alias = "mappings")]
    map: Vec<MapRule>,
}

/// Build a new object from `source -> target` path pairs
pub fn map(data: Value, rules: &Value) -> Result<Value> {
    let rules: MapRules = parse_rules(NodeType::Map, rules)?;
    map_each(data, |item| {
        if !item.is_object() {
            return Err(EngineError::handler("map requires object data"));
        }
        let mut out = Value::Object(Map::new());
        for rule in &rules.map {
            let value = lookup_path(&item, &rule.source).cloned().unwrap_or(Value::Null);
            set_path(&mut out, &rule.target, value);
        }
        Ok(out)
    })
}

#[derive(Debug, Deserialize)]
struct RenameRules {
    from: Option<String>,
    to: Option<String>,
    #[serde(default)]
    mappings: BTreeMap<String, String>,
}

/// Rename top-level keys, keeping key order and untouched keys
pub fn rename(data: Value, rules: &Value) -> Result<Value> {
    let rules: RenameRules = parse_rules(NodeType::Rename, rules)?;
    let mut mapping = rules.mappings;
    if let (Some(from), Some(to)) = (rules.from, rules.to) {
        mapping.insert(from, to);
    }
    map_each(data, |item| {
        Ok(match item {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| match mapping.get(&key) {
                        Some(renamed) => (renamed.clone(), value),
                        None => (key, value),
                    })
                    .collect(),
            ),
            other => other,
        })
    })
}

#[derive(Debug, Deserialize)]
struct RemoveRules {
    #[serde(default)]
    fields: OneOrMany<String>,
}

/// Drop fields (dot paths allowed)
pub fn remove(data: Value, rules: &Value) -> Result<Value> {
    let fields = parse_rules::<RemoveRules>(NodeType::Remove, rules)?.fields.into_vec();
    map_each(data, |mut item| {
        if item.is_object() {
            for field in &fields {
                remove_path(&mut item, field);
            }
        }
        Ok(item)
    })
}

#[derive(Debug, Deserialize)]
struct CopyRules {
    from: String,
    to: String,
}

/// Copy the value at `from` to `to`
pub fn copy(data: Value, rules: &Value) -> Result<Value> {
    let rules: CopyRules = parse_rules(NodeType::Copy, rules)?;
    if rules.from.is_empty() || rules.to.is_empty() {
        return Err(EngineError::config("copy requires 'from' and 'to' fields"));
    }
    map_each(data, |mut item| {
        let value = lookup_path(&item, &rules.from).cloned().unwrap_or(Value::Null);
        set_path(&mut item, &rules.to, value);
        Ok(item)
    })
}

#[derive(Debug, Deserialize)]
struct ConcatRules {
    #[serde(default)]
    sources: Vec<String>,
    target: Option<String>,
    #[serde(default)]
    separator: String,
}

/// Join several fields into one string field
pub fn concat(data: Value, rules: &Value) -> Result<Value> {
    let rules: ConcatRules = parse_rules(NodeType::Concat, rules)?;
    let target = rules
        .target
        .filter(|t| !t.is_empty())
        .ok_or_else(|| EngineError::config("concat requires a 'target' field"))?;
    map_each(data, |mut item| {
        let joined = rules
            .sources
            .iter()
            .map(|source| match lookup_path(&item, source) {
                None | Some(Value::Null) => String::new(),
                Some(value) => to_text(value),
            })
            .collect::<Vec<_>>()
            .join(rules.separator.as_str());
        set_path(&mut item, &target, Value::String(joined));
        Ok(item)
    })
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Conversion {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    Array,
    Object,
}

#[derive(Debug, Deserialize)]
struct ConvertRules {
    field: String,
    #[serde(alias = "toType", alias = "type")]
    to_type: Conversion,
}

/// Convert one field to another JSON type
pub fn convert_type(data: Value, rules: &Value) -> Result<Value> {
    let rules: ConvertRules = parse_rules(NodeType::ConvertType, rules)?;
    map_each(data, |mut item| {
        let converted = match lookup_path(&item, &rules.field) {
            None | Some(Value::Null) => None,
            Some(value) => Some(convert_value(value, rules.to_type)?),
        };
        if let Some(converted) = converted {
            set_path(&mut item, &rules.field, converted);
        }
        Ok(item)
    })
}

fn convert_value(value: &Value, to: Conversion) -> Result<Value> {
    Ok(match to {
        Conversion::String => Value::String(to_text(value)),
        Conversion::Number => number(to_number(value)?),
        Conversion::Integer => Value::from(to_number(value)?.floor() as i64),
        Conversion::Boolean => Value::Bool(match value {
            Value::Bool(b) => *b,
            Value::String(s) => s.eq_ignore_ascii_case("true") || s == "1",
            other => is_truthy(other),
        }),
        Conversion::Date => {
            let date = parse_date(value)
                .ok_or_else(|| EngineError::handler(format!("cannot convert {} to a date", to_text(value))))?;
            Value::String(super::date::iso(&date))
        }
        Conversion::Array => match value {
            Value::Array(_) => value.clone(),
            other => Value::Array(vec![other.clone()]),
        },
        Conversion::Object => match value {
            Value::Object(_) => value.clone(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other.clone());
                Value::Object(map)
            }
        },
    })
}

#[derive(Debug, Deserialize)]
struct SplitRules {
    field: Option<String>,
    #[serde(default = "default_separator")]
    separator: String,
    target: Option<String>,
    limit: Option<usize>,
    #[serde(default = "default_trim")]
    trim: bool,
}

fn default_separator() -> String {
    ",".to_string()
}

fn default_trim() -> bool {
    true
}

/// Split a string field into parts (or truncate an array)
pub fn split(data: Value, rules: &Value) -> Result<Value> {
    let rules: SplitRules = parse_rules(NodeType::Split, rules)?;
    let value = match rules.field.as_deref() {
        Some(field) => lookup_path(&data, field).cloned().unwrap_or(Value::Null),
        None => data.clone(),
    };

    let parts = match value {
        Value::String(text) => {
            let mut parts: Vec<Value> = text
                .split(rules.separator.as_str())
                .map(|p| Value::String(if rules.trim { p.trim().to_string() } else { p.to_string() }))
                .collect();
            if let Some(limit) = rules.limit {
                parts.truncate(limit);
            }
            Value::Array(parts)
        }
        Value::Array(mut items) => {
            if let Some(limit) = rules.limit {
                items.truncate(limit);
            }
            Value::Array(items)
        }
        other => other,
    };

    match rules.target {
        Some(target) => {
            let mut out = data;
            set_path(&mut out, &target, parts);
            Ok(out)
        }
        None => Ok(parts),
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum MergeStrategy {
    #[default]
    Shallow,
    Deep,
}

#[derive(Debug, Deserialize)]
struct MergeRules {
    /// A path into the data, or an object (inline or from a resolved template)
    with: Value,
    #[serde(default)]
    target: String,
    #[serde(default)]
    strategy: MergeStrategy,
}

/// Merge an object into the value at `target` (the data root by default)
pub fn merge(data: Value, rules: &Value) -> Result<Value> {
    let rules: MergeRules = parse_rules(NodeType::Merge, rules)?;
    let patch = match &rules.with {
        Value::String(path) => lookup_path(&data, path).cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };
    let patch = match patch {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(EngineError::handler(format!(
                "merge requires an object to merge, got {}",
                to_text(&other)
            )))
        }
    };
    if rules.target.trim().is_empty() && !data.is_object() {
        return Err(EngineError::handler("merge without a target requires object data"));
    }

    let mut merged = match lookup_path(&data, &rules.target) {
        Some(Value::Object(existing)) => existing.clone(),
        _ => Map::new(),
    };
    let merged = match rules.strategy {
        MergeStrategy::Shallow => {
            merged.extend(patch);
            Value::Object(merged)
        }
        MergeStrategy::Deep => {
            let mut merged = Value::Object(merged);
            deep_merge(&mut merged, Value::Object(patch));
            merged
        }
    };

    let mut out = data;
    set_path(&mut out, &rules.target, merged);
    Ok(out)
}

/// Recursive merge: objects by key, arrays by index, anything else replaced
fn deep_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(patch)) => {
            for (i, value) in patch.into_iter().enumerate() {
                match base.get_mut(i) {
                    Some(existing) => deep_merge(existing, value),
                    None => base.push(value),
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_builds_nested_targets() {
        let data = json!({"first_name": "Ada", "address": {"city": "London"}});
        let rules = json!({"map": [
            {"source": "first_name", "target": "name.first"},
            {"source": "address.city", "target": "city"},
            {"source": "missing", "target": "gone"},
        ]});
        assert_eq!(
            map(data, &rules).unwrap(),
            json!({"name": {"first": "Ada"}, "city": "London", "gone": null})
        );
        assert!(map(json!("text"), &rules).is_err());
    }

    #[test]
    fn test_rename_remove_copy_over_arrays() {
        let data = json!([{"a": 1, "b": 2}, {"a": 3, "b": 4}]);
        let renamed = rename(data, &json!({"from": "a", "to": "x"})).unwrap();
        assert_eq!(renamed, json!([{"x": 1, "b": 2}, {"x": 3, "b": 4}]));

        let removed = remove(renamed, &json!({"fields": "b"})).unwrap();
        assert_eq!(removed, json!([{"x": 1}, {"x": 3}]));

        let copied = copy(removed, &json!({"from": "x", "to": "meta.x"})).unwrap();
        assert_eq!(copied[1], json!({"x": 3, "meta": {"x": 3}}));
    }

    #[test]
    fn test_concat_and_convert() {
        let data = json!({"first": "Ada", "last": "Lovelace", "age": "36", "vip": "true"});
        let joined = concat(data, &json!({"sources": ["first", "last", "nope"], "target": "full", "separator": " "})).unwrap();
        assert_eq!(joined["full"], "Ada Lovelace ");

        let converted = convert_type(joined, &json!({"field": "age", "toType": "number"})).unwrap();
        assert_eq!(converted["age"], json!(36));
        let converted = convert_type(converted, &json!({"field": "vip", "to_type": "boolean"})).unwrap();
        assert_eq!(converted["vip"], json!(true));

        assert!(concat(json!({}), &json!({"sources": []})).is_err());
    }

    #[test]
    fn test_split() {
        let data = json!({"tags": "a, b ,c"});
        assert_eq!(split(data.clone(), &json!({"field": "tags"})).unwrap(), json!(["a", "b", "c"]));
        assert_eq!(
            split(data, &json!({"field": "tags", "target": "list", "limit": 2})).unwrap(),
            json!({"tags": "a, b ,c", "list": ["a", "b"]})
        );
    }

    #[test]
    fn test_merge_shallow_and_deep() {
        let data = json!({
            "user": {"name": "Ada", "prefs": {"theme": "dark", "lang": "en"}},
            "patch": {"prefs": {"lang": "fr"}, "active": true},
        });

        let shallow = merge(data.clone(), &json!({"with": "patch", "target": "user"})).unwrap();
        assert_eq!(
            shallow["user"],
            json!({"name": "Ada", "prefs": {"lang": "fr"}, "active": true})
        );

        let deep = merge(data.clone(), &json!({"with": "patch", "target": "user", "strategy": "deep"})).unwrap();
        assert_eq!(
            deep["user"],
            json!({"name": "Ada", "prefs": {"theme": "dark", "lang": "fr"}, "active": true})
        );
        assert_eq!(deep["patch"], data["patch"]);
    }

    #[test]
    fn test_merge_objects_targets_and_errors() {
        let root = merge(json!({"a": 1}), &json!({"with": {"b": 2}})).unwrap();
        assert_eq!(root, json!({"a": 1, "b": 2}));

        let created = merge(json!({"a": 1}), &json!({"with": {"x": [1, 2]}, "target": "meta.extra"})).unwrap();
        assert_eq!(created, json!({"a": 1, "meta": {"extra": {"x": [1, 2]}}}));

        let lists = merge(
            json!({"t": {"x": [{"a": 1}, 2]}}),
            &json!({"with": {"x": [{"b": 2}, 3, 4]}, "target": "t", "strategy": "deep"}),
        )
        .unwrap();
        assert_eq!(lists["t"]["x"], json!([{"a": 1, "b": 2}, 3, 4]));

        assert_eq!(merge(json!({"a": 1}), &json!({"with": "missing"})).unwrap(), json!({"a": 1}));
        assert!(merge(json!({"a": 1}), &json!({"with": "a"})).is_err());
        assert!(merge(json!([1, 2]), &json!({"with": {"b": 2}})).is_err());
        assert!(merge(json!({}), &json!({"with": {}, "strategy": "sideways"})).is_err());
    }
}

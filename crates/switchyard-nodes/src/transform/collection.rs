//! Array transforms: filter, aggregate, group

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::{Map, Value};
use switchyard_engine::expression::{self, number, to_number, to_text};
use switchyard_engine::template::{lookup_path, resolve_expression_source};
use switchyard_engine::{EngineError, NodeType, Result};

use crate::data::{parse_rules, with_data, OneOrMany};

#[derive(Debug, Deserialize)]
struct FilterRules {
    condition: String,
}

/// Keep array items (or the whole value) for which `condition` holds.
///
/// The condition sees the context plus `data`, and `item` / `$item` for
/// each array element.
pub fn filter(data: Value, rules: &Value, context: &Value) -> Result<Value> {
    let rules: FilterRules = parse_rules(NodeType::Filter, rules)?;
    if rules.condition.trim().is_empty() {
        return Err(EngineError::config("filter requires a 'condition'"));
    }
    let holds = |item: Option<&Value>| -> Result<bool> {
        let scope = with_data(context, &data, item);
        let source = resolve_expression_source(&rules.condition, &scope)?;
        Ok(expression::evaluate(&source, &scope)?.matched)
    };

    match &data {
        Value::Array(items) => {
            let mut kept = Vec::new();
            for item in items {
                if holds(Some(item))? {
                    kept.push(item.clone());
                }
            }
            Ok(Value::Array(kept))
        }
        _ => Ok(if holds(None)? { data.clone() } else { Value::Null }),
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Aggregation {
    Sum,
    #[serde(alias = "average")]
    Avg,
    Count,
    Min,
    Max,
    First,
    Last,
    Unique,
    Join,
}

#[derive(Debug, Deserialize)]
struct AggregateOperation {
    field: Option<String>,
    #[serde(rename = "type")]
    kind: Aggregation,
    target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AggregateRules {
    #[serde(default, alias = "groupBy")]
    group_by: OneOrMany<String>,
    #[serde(default)]
    operations: Vec<AggregateOperation>,
}

/// Aggregate an array, optionally per group
pub fn aggregate(data: Value, rules: &Value) -> Result<Value> {
    let rules: AggregateRules = parse_rules(NodeType::Aggregate, rules)?;
    let Value::Array(items) = data else {
        return Err(EngineError::handler("aggregate requires array data"));
    };
    let group_by = rules.group_by.into_vec();

    let summarize = |rows: &[Value], out: &mut Map<String, Value>| -> Result<()> {
        for op in &rules.operations {
            let key = op
                .target
                .clone()
                .or_else(|| op.field.clone())
                .unwrap_or_else(|| format!("{:?}", op.kind).to_lowercase());
            out.insert(key, apply_aggregation(rows, op.kind, op.field.as_deref())?);
        }
        Ok(())
    };

    if group_by.is_empty() {
        let mut out = Map::new();
        summarize(&items, &mut out)?;
        return Ok(Value::Object(out));
    }

    let mut results = Vec::new();
    for (keys, rows) in group_rows(&items, &group_by) {
        let mut out = Map::new();
        for (field, key) in group_by.iter().zip(keys) {
            out.insert(field.clone(), Value::String(key));
        }
        summarize(&rows, &mut out)?;
        results.push(Value::Object(out));
    }
    Ok(Value::Array(results))
}

fn apply_aggregation(rows: &[Value], kind: Aggregation, field: Option<&str>) -> Result<Value> {
    if rows.is_empty() {
        return Ok(Value::Null);
    }
    let values: Vec<&Value> = match field {
        Some(field) => rows
            .iter()
            .filter_map(|row| lookup_path(row, field))
            .filter(|v| !v.is_null())
            .collect(),
        None => rows.iter().collect(),
    };
    let numbers = || values.iter().map(|v| to_number(v)).collect::<Result<Vec<f64>>>();

    Ok(match kind {
        Aggregation::Sum => number(numbers()?.iter().sum()),
        Aggregation::Avg => {
            let nums = numbers()?;
            if nums.is_empty() {
                Value::Null
            } else {
                number(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        Aggregation::Count => Value::from(values.len()),
        Aggregation::Min => extreme(&values, |a, b| a < b)?,
        Aggregation::Max => extreme(&values, |a, b| a > b)?,
        Aggregation::First => values.first().map(|v| (*v).clone()).unwrap_or(Value::Null),
        Aggregation::Last => values.last().map(|v| (*v).clone()).unwrap_or(Value::Null),
        Aggregation::Unique => {
            let mut seen = HashSet::new();
            Value::Array(
                values
                    .iter()
                    .filter(|v| seen.insert(v.to_string()))
                    .map(|v| (*v).clone())
                    .collect(),
            )
        }
        Aggregation::Join => Value::String(values.iter().map(|v| to_text(v)).collect::<Vec<_>>().join(", ")),
    })
}

/// The original value whose numeric coercion wins under `better`
fn extreme(values: &[&Value], better: impl Fn(f64, f64) -> bool) -> Result<Value> {
    let mut best: Option<(f64, &Value)> = None;
    for &value in values {
        let n = to_number(value)?;
        if best.map_or(true, |(b, _)| better(n, b)) {
            best = Some((n, value));
        }
    }
    Ok(best.map(|(_, v)| v.clone()).unwrap_or(Value::Null))
}

/// Group rows by the stringified values at `keys`, in first-seen order
fn group_rows(items: &[Value], keys: &[String]) -> Vec<(Vec<String>, Vec<Value>)> {
    let mut groups: Vec<(Vec<String>, Vec<Value>)> = Vec::new();
    for item in items {
        let key: Vec<String> = keys
            .iter()
            .map(|k| lookup_path(item, k).map(to_text).unwrap_or_default())
            .collect();
        match groups.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, rows)) => rows.push(item.clone()),
            None => groups.push((key, vec![item.clone()])),
        }
    }
    groups
}

#[derive(Debug, Deserialize)]
struct GroupRules {
    #[serde(default, alias = "groupBy")]
    group_by: OneOrMany<String>,
}

/// Bucket array items into an object keyed by the group value(s), joined by `|`
pub fn group(data: Value, rules: &Value) -> Result<Value> {
    let group_by = parse_rules::<GroupRules>(NodeType::Group, rules)?.group_by.into_vec();
    let Value::Array(items) = data else {
        return Err(EngineError::handler("group requires array data"));
    };
    if group_by.is_empty() {
        return Err(EngineError::config("group requires at least one groupBy field"));
    }
    let mut out = Map::new();
    for (keys, rows) in group_rows(&items, &group_by) {
        out.insert(keys.join("|"), Value::Array(rows));
    }
    Ok(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orders() -> Value {
        json!([
            {"region": "eu", "amount": 120, "status": "paid"},
            {"region": "us", "amount": 80, "status": "open"},
            {"region": "eu", "amount": 30, "status": "paid"},
        ])
    }

    #[test]
    fn test_filter_items_and_scalar() {
        let context = json!({"input": {"min": 100}});
        let kept = filter(orders(), &json!({"condition": "item.amount >= input.min"}), &context).unwrap();
        assert_eq!(kept.as_array().unwrap().len(), 1);

        let kept = filter(orders(), &json!({"condition": "{{ $item.status }} == 'paid'"}), &context).unwrap();
        assert_eq!(kept.as_array().unwrap().len(), 2);

        let single = json!({"amount": 5});
        assert_eq!(filter(single.clone(), &json!({"condition": "data.amount > 1"}), &context).unwrap(), single);
        assert_eq!(filter(single, &json!({"condition": "data.amount > 10"}), &context).unwrap(), Value::Null);
    }

    #[test]
    fn test_aggregate_with_and_without_groups() {
        let rules = json!({"operations": [
            {"field": "amount", "type": "sum", "target": "total"},
            {"field": "amount", "type": "max"},
            {"type": "count", "target": "orders"},
        ]});
        assert_eq!(
            aggregate(orders(), &rules).unwrap(),
            json!({"total": 230, "amount": 120, "orders": 3})
        );

        let grouped = aggregate(
            orders(),
            &json!({"groupBy": "region", "operations": [{"field": "amount", "type": "avg", "target": "mean"}]}),
        )
        .unwrap();
        assert_eq!(grouped, json!([{"region": "eu", "mean": 75}, {"region": "us", "mean": 80}]));

        assert!(aggregate(json!({"a": 1}), &rules).is_err());
    }

    #[test]
    fn test_group_by_one_and_many_keys() {
        let by_region = group(orders(), &json!({"group_by": ["region"]})).unwrap();
        assert_eq!(by_region["eu"].as_array().unwrap().len(), 2);

        let by_both = group(orders(), &json!({"groupBy": ["region", "status"]})).unwrap();
        assert!(by_both.get("us|open").is_some());

        assert!(group(orders(), &json!({})).is_err());
    }
}

//! Date and timestamp transforms
//!
//! Dates are read from RFC 3339 strings, `YYYY-MM-DD[ HH:MM:SS]` strings or
//! epoch milliseconds, and written back as RFC 3339 with millisecond
//! precision in UTC.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use switchyard_engine::template::{lookup_path, set_path};
use switchyard_engine::{EngineError, NodeType, Result};

use crate::data::{map_each, parse_rules};

/// Parse the date representations accepted by transforms
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(naive.and_utc());
                }
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
            }
            s.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)
        }
        _ => None,
    }
}

pub fn iso(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Write `value` at `target` (or back at `field`), or return it bare when
/// neither is set
fn place(item: Value, field: Option<&str>, target: Option<&str>, value: Value) -> Value {
    match target.or(field) {
        Some(path) => {
            let mut out = item;
            set_path(&mut out, path, value);
            out
        }
        None => value,
    }
}

fn read<'a>(item: &'a Value, field: Option<&str>) -> Option<&'a Value> {
    match field {
        Some(field) => lookup_path(item, field),
        None => Some(item),
    }
}

#[derive(Debug, Deserialize)]
struct DateFormatRules {
    field: Option<String>,
    #[serde(default = "default_format")]
    format: String,
    target: Option<String>,
}

fn default_format() -> String {
    "ISO".to_string()
}

/// Render a date field in a named or pattern format
pub fn date_format(data: Value, rules: &Value) -> Result<Value> {
    let rules: DateFormatRules = parse_rules(NodeType::DateFormat, rules)?;
    map_each(data, |item| {
        let Some(date) = read(&item, rules.field.as_deref()).and_then(parse_date) else {
            return Ok(item);
        };
        let formatted = render(&date, &rules.format)?;
        Ok(place(item, rules.field.as_deref(), rules.target.as_deref(), Value::String(formatted)))
    })
}

fn render(date: &DateTime<Utc>, format: &str) -> Result<String> {
    Ok(match format.to_ascii_uppercase().as_str() {
        "ISO" => iso(date),
        "DATE" => date.format("%Y-%m-%d").to_string(),
        "TIME" => date.format("%H:%M:%S").to_string(),
        "DATETIME" => date.format("%Y-%m-%d %H:%M:%S").to_string(),
        "TIMESTAMP" => date.timestamp_millis().to_string(),
        _ if format.contains('%') => strftime(date, format)?,
        _ => strftime(date, &translate_pattern(format))?,
    })
}

/// Format with a user pattern, rejecting invalid specifiers up front
fn strftime(date: &DateTime<Utc>, pattern: &str) -> Result<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(EngineError::config(format!("invalid date format '{}'", pattern)));
    }
    Ok(date.format_with_items(items.into_iter()).to_string())
}

/// Translate `YYYY-MM-DD HH:mm:ss` style tokens to strftime
fn translate_pattern(pattern: &str) -> String {
    const TOKENS: &[(&str, &str)] = &[
        ("YYYY", "%Y"),
        ("SSS", "%3f"),
        ("YY", "%y"),
        ("MM", "%m"),
        ("DD", "%d"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("ss", "%S"),
    ];
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    'outer: while !rest.is_empty() {
        for (token, strftime_item) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(strftime_item);
                rest = tail;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
        }
        rest = chars.as_str();
    }
    out
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    #[default]
    Days,
    Weeks,
    Months,
    Years,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DateOperation {
    Add,
    Subtract,
}

#[derive(Debug, Deserialize)]
struct DateOperationRules {
    field: Option<String>,
    operation: DateOperation,
    value: i64,
    #[serde(default)]
    unit: TimeUnit,
    target: Option<String>,
}

/// Add or subtract a duration from a date field
pub fn date_operation(data: Value, rules: &Value) -> Result<Value> {
    let rules: DateOperationRules = parse_rules(NodeType::DateOperation, rules)?;
    let amount = match rules.operation {
        DateOperation::Add => rules.value,
        DateOperation::Subtract => -rules.value,
    };
    map_each(data, |item| {
        let Some(date) = read(&item, rules.field.as_deref()).and_then(parse_date) else {
            return Ok(item);
        };
        let shifted = shift(date, amount, rules.unit)
            .ok_or_else(|| EngineError::handler("date operation overflowed"))?;
        Ok(place(item, rules.field.as_deref(), rules.target.as_deref(), Value::String(iso(&shifted))))
    })
}

fn shift(date: DateTime<Utc>, amount: i64, unit: TimeUnit) -> Option<DateTime<Utc>> {
    let months = |n: i64| -> Option<DateTime<Utc>> {
        let m = Months::new(u32::try_from(n.unsigned_abs()).ok()?);
        if n >= 0 {
            date.checked_add_months(m)
        } else {
            date.checked_sub_months(m)
        }
    };
    match unit {
        TimeUnit::Milliseconds => date.checked_add_signed(Duration::try_milliseconds(amount)?),
        TimeUnit::Seconds => date.checked_add_signed(Duration::try_seconds(amount)?),
        TimeUnit::Minutes => date.checked_add_signed(Duration::try_minutes(amount)?),
        TimeUnit::Hours => date.checked_add_signed(Duration::try_hours(amount)?),
        TimeUnit::Days => date.checked_add_signed(Duration::try_days(amount)?),
        TimeUnit::Weeks => date.checked_add_signed(Duration::try_weeks(amount)?),
        TimeUnit::Months => months(amount),
        TimeUnit::Years => months(amount.checked_mul(12)?),
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
enum TimestampOperation {
    #[default]
    ToTimestamp,
    FromTimestamp,
}

#[derive(Debug, Deserialize)]
struct TimestampRules {
    field: Option<String>,
    target: Option<String>,
    #[serde(default)]
    operation: TimestampOperation,
    unit: Option<TimeUnit>,
}

/// Convert between dates and epoch timestamps; without `field` the current
/// time is used
pub fn timestamp(data: Value, rules: &Value) -> Result<Value> {
    let rules: TimestampRules = parse_rules(NodeType::Timestamp, rules)?;
    let seconds = matches!(rules.unit, Some(TimeUnit::Seconds));
    map_each(data, |item| {
        let result = match (rules.operation, rules.field.as_deref()) {
            (TimestampOperation::ToTimestamp, None) => epoch(&Utc::now(), seconds),
            (TimestampOperation::ToTimestamp, Some(field)) => {
                match lookup_path(&item, field).and_then(parse_date) {
                    Some(date) => epoch(&date, seconds),
                    None => return Ok(item),
                }
            }
            (TimestampOperation::FromTimestamp, field) => {
                let Some(raw) = read(&item, field).and_then(Value::as_i64) else {
                    return Ok(item);
                };
                let millis = if seconds { raw.saturating_mul(1000) } else { raw };
                match DateTime::from_timestamp_millis(millis) {
                    Some(date) => Value::String(iso(&date)),
                    None => return Ok(item),
                }
            }
        };
        Ok(place(item, rules.field.as_deref(), rules.target.as_deref(), result))
    })
}

fn epoch(date: &DateTime<Utc>, seconds: bool) -> Value {
    if seconds {
        Value::from(date.timestamp())
    } else {
        Value::from(date.timestamp_millis())
    }
}

//! `update_database`

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use switchyard_engine::{EngineError, HandlerInput, NodeHandler, NodeType, Result};

use crate::data::parse_rules;

/// Table-oriented storage targeted by `update_database` nodes
#[async_trait]
pub trait Database: Send + Sync {
    /// Merge `data` into every row of `table` matching `filter`, or insert it
    /// as a new row when no filter is given. Returns the affected row count.
    async fn update(&self, table: &str, data: &Map<String, Value>, filter: Option<&Map<String, Value>>) -> Result<u64>;
}

/// Process-local tables of JSON rows
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    tables: RwLock<HashMap<String, Vec<Value>>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a table's rows
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }
}

fn matches(row: &Value, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(key, expected)| row.get(key) == Some(expected))
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn update(&self, table: &str, data: &Map<String, Value>, filter: Option<&Map<String, Value>>) -> Result<u64> {
        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        match filter.filter(|f| !f.is_empty()) {
            Some(filter) => {
                let mut count = 0;
                for row in rows.iter_mut().filter(|row| matches(row, filter)) {
                    if let Value::Object(fields) = row {
                        fields.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
                        count += 1;
                    }
                }
                Ok(count)
            }
            None => {
                rows.push(Value::Object(data.clone()));
                Ok(1)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateRules {
    table: String,
    #[serde(default)]
    data: Map<String, Value>,
    #[serde(default, alias = "where")]
    filter: Option<Map<String, Value>>,
}

pub struct UpdateDatabaseHandler {
    database: std::sync::Arc<dyn Database>,
}

impl UpdateDatabaseHandler {
    pub fn new(database: std::sync::Arc<dyn Database>) -> Self {
        Self { database }
    }
}

#[async_trait]
impl NodeHandler for UpdateDatabaseHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value> {
        let rules: UpdateRules = parse_rules(NodeType::UpdateDatabase, &input.resolved_config(false)?)?;
        if rules.table.trim().is_empty() {
            return Err(EngineError::config("update_database requires a 'table'"));
        }
        let updated = self.database.update(&rules.table, &rules.data, rules.filter.as_ref()).await?;
        log::debug!("Node '{}' updated {} row(s) in '{}'", input.node.id, updated, rules.table);
        Ok(json!({
            "table": rules.table,
            "data": rules.data,
            "updated_count": updated,
            "status": "success",
        }))
    }
}

//! In-memory execution store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::{ExecutionStore, NodeLogEntry};
use crate::error::{EngineError, Result};
use crate::types::{Execution, ExecutionId, ExecutionStatus, LogEvent, LogId, NodeExecutionLog};

/// Executions and node logs kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    executions: RwLock<HashMap<ExecutionId, Execution>>,
    logs: Mutex<Vec<NodeExecutionLog>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of executions recorded so far
    pub fn len(&self) -> usize {
        self.executions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create_execution(
        &self,
        workflow_id: &str,
        trigger_id: Option<&str>,
        context: Value,
    ) -> Result<Execution> {
        let execution = Execution {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            trigger_id: trigger_id.map(str::to_string),
            status: ExecutionStatus::Running,
            context,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.executions
            .write()
            .insert(execution.id.clone(), execution.clone());
        Ok(execution)
    }

    async fn update_execution(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        context: Value,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut executions = self.executions.write();
        let execution = executions
            .get_mut(execution_id)
            .ok_or_else(|| EngineError::store(format!("execution '{}' not found", execution_id)))?;
        execution.status = status;
        execution.context = context;
        execution.completed_at = completed_at;
        Ok(())
    }

    async fn log_node_execution(&self, entry: NodeLogEntry) -> Result<LogId> {
        let log = NodeExecutionLog {
            id: uuid::Uuid::new_v4().to_string(),
            execution_id: entry.execution_id,
            node_id: entry.node_id,
            status: entry.status,
            started_at: Utc::now(),
            completed_at: None,
            data: entry.data,
        };
        let id = log.id.clone();
        self.logs.lock().push(log);
        Ok(id)
    }

    async fn update_node_execution_log(
        &self,
        log_id: &str,
        status: LogEvent,
        completed_at: Option<DateTime<Utc>>,
        data: Option<Value>,
    ) -> Result<()> {
        let mut logs = self.logs.lock();
        let log = logs
            .iter_mut()
            .find(|l| l.id == log_id)
            .ok_or_else(|| EngineError::store(format!("node log '{}' not found", log_id)))?;
        log.status = status;
        log.completed_at = completed_at;
        log.data = data;
        Ok(())
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<Execution>> {
        Ok(self.executions.read().get(execution_id).cloned())
    }

    async fn node_logs(&self, execution_id: &str) -> Result<Vec<NodeExecutionLog>> {
        Ok(self
            .logs
            .lock()
            .iter()
            .filter(|l| l.execution_id == execution_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_execution_lifecycle() {
        let store = InMemoryExecutionStore::new();
        let execution = store
            .create_execution("wf", Some("trigger-1"), json!({"input": {}}))
            .await
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert_eq!(store.len(), 1);

        let done = Utc::now();
        store
            .update_execution(&execution.id, ExecutionStatus::Completed, json!({"output": {"a": 1}}), Some(done))
            .await
            .unwrap();

        let stored = store.get_execution(&execution.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
        assert_eq!(stored.context["output"]["a"], 1);
        assert_eq!(stored.completed_at, Some(done));
        assert_eq!(stored.trigger_id.as_deref(), Some("trigger-1"));
    }

    #[tokio::test]
    async fn test_unknown_execution_is_store_error() {
        let store = InMemoryExecutionStore::new();
        let err = store
            .update_execution("missing", ExecutionStatus::Failed, Value::Null, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
    }

    #[tokio::test]
    async fn test_node_logs_are_scoped_and_ordered() {
        let store = InMemoryExecutionStore::new();
        let first = store
            .log_node_execution(NodeLogEntry::new("e1", "a", LogEvent::Start, None))
            .await
            .unwrap();
        store
            .log_node_execution(NodeLogEntry::new("e2", "x", LogEvent::Start, None))
            .await
            .unwrap();
        store
            .log_node_execution(NodeLogEntry::new("e1", "b", LogEvent::Start, None))
            .await
            .unwrap();
        store
            .update_node_execution_log(&first, LogEvent::Success, Some(Utc::now()), Some(json!({"ok": true})))
            .await
            .unwrap();

        let logs = store.node_logs("e1").await.unwrap();
        let nodes: Vec<&str> = logs.iter().map(|l| l.node_id.as_str()).collect();
        assert_eq!(nodes, vec!["a", "b"]);
        assert_eq!(logs[0].status, LogEvent::Success);
        assert!(logs[0].completed_at.is_some());
        assert_eq!(logs[1].status, LogEvent::Start);
    }
}

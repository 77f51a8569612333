//! Event types for observing workflow runs
//!
//! Events are pushed from the executor to any consumer (a log shipper, a UI
//! channel, a test collector) as the run progresses. Sending is best-effort:
//! a failed send is logged and never fails the run.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Trait for receiving workflow events
///
/// Abstracts over the transport so the engine can be embedded anywhere.
pub trait EventSink: Send + Sync {
    /// Returns an error if the event could not be delivered (e.g. channel closed)
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during workflow execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    #[serde(rename_all = "camelCase")]
    ExecutionStarted {
        workflow_id: String,
        execution_id: String,
    },

    #[serde(rename_all = "camelCase")]
    ExecutionCompleted {
        workflow_id: String,
        execution_id: String,
    },

    #[serde(rename_all = "camelCase")]
    ExecutionFailed {
        workflow_id: String,
        execution_id: String,
        error: String,
    },

    #[serde(rename_all = "camelCase")]
    NodeStarted {
        node_id: String,
        execution_id: String,
        node_type: String,
    },

    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node_id: String,
        execution_id: String,
        output: serde_json::Value,
    },

    #[serde(rename_all = "camelCase")]
    NodeFailed {
        node_id: String,
        execution_id: String,
        error: String,
    },

    /// An action node failed and will be attempted again
    #[serde(rename_all = "camelCase")]
    NodeRetrying {
        node_id: String,
        execution_id: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },

    /// A loop node is about to run its body for one pass
    #[serde(rename_all = "camelCase")]
    LoopIteration {
        node_id: String,
        execution_id: String,
        iteration: usize,
    },
}

impl WorkflowEvent {
    pub fn node_started(node_id: &str, execution_id: &str, node_type: &str) -> Self {
        Self::NodeStarted {
            node_id: node_id.to_string(),
            execution_id: execution_id.to_string(),
            node_type: node_type.to_string(),
        }
    }

    pub fn node_failed(node_id: &str, execution_id: &str, error: impl Into<String>) -> Self {
        Self::NodeFailed {
            node_id: node_id.to_string(),
            execution_id: execution_id.to_string(),
            error: error.into(),
        }
    }

    pub fn loop_iteration(node_id: &str, execution_id: &str, iteration: usize) -> Self {
        Self::LoopIteration {
            node_id: node_id.to_string(),
            execution_id: execution_id.to_string(),
            iteration,
        }
    }

    /// Execution this event belongs to
    pub fn execution_id(&self) -> &str {
        match self {
            Self::ExecutionStarted { execution_id, .. }
            | Self::ExecutionCompleted { execution_id, .. }
            | Self::ExecutionFailed { execution_id, .. }
            | Self::NodeStarted { execution_id, .. }
            | Self::NodeCompleted { execution_id, .. }
            | Self::NodeFailed { execution_id, .. }
            | Self::NodeRetrying { execution_id, .. }
            | Self::LoopIteration { execution_id, .. } => execution_id,
        }
    }
}

/// Deliver an event, logging instead of failing when the sink refuses it
pub(crate) fn emit(sink: &dyn EventSink, event: WorkflowEvent) {
    if let Err(e) = sink.send(event) {
        log::warn!("Dropped workflow event: {}", e);
    }
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for tests that assert on the emitted sequence.
pub struct VecEventSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClosedSink;

    impl EventSink for ClosedSink {
        fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
            Err(EventError::channel_closed())
        }
    }

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();
        sink.send(WorkflowEvent::loop_iteration("loop1", "exec1", 3)).unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            WorkflowEvent::LoopIteration { node_id, iteration, .. } => {
                assert_eq!(node_id, "loop1");
                assert_eq!(*iteration, 3);
            }
            _ => panic!("Expected LoopIteration event"),
        }
        assert_eq!(events[0].execution_id(), "exec1");

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_event_wire_format() {
        let event = WorkflowEvent::node_started("n1", "exec1", "http_request");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "nodeStarted");
        assert_eq!(json["nodeId"], "n1");
        assert_eq!(json["nodeType"], "http_request");
    }

    #[test]
    fn test_emit_swallows_send_errors() {
        emit(&ClosedSink, WorkflowEvent::node_failed("n1", "exec1", "boom"));
        emit(&NullEventSink, WorkflowEvent::node_failed("n1", "exec1", "boom"));
    }
}

//! Retry policy for action nodes

use std::time::Duration;

use crate::config::ExecutionSettings;
use crate::error::EngineError;
use crate::types::Node;

/// How often and how patiently an action node is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one
    pub retries: u32,
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay_ms: u64) -> Self {
        Self { retries, delay_ms }
    }

    /// Node settings capped by the engine limits
    pub fn from_node(node: &Node, settings: &ExecutionSettings) -> Self {
        let retries = node.retry_attempts.min(settings.max_retry_attempts);
        let delay_ms = node.retry_delay_ms.min(settings.max_retry_delay_ms);
        if retries < node.retry_attempts || delay_ms < node.retry_delay_ms {
            log::warn!(
                "Node '{}' retry settings capped to {} attempts / {} ms",
                node.id,
                retries,
                delay_ms
            );
        }
        Self { retries, delay_ms }
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Whether a failure on `attempt` (1-based) should be followed by another try
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Final error once no attempts remain.
    ///
    /// A node with no retries configured surfaces the handler error unchanged.
    pub fn exhausted(&self, attempts: u32, last: EngineError) -> EngineError {
        if self.retries == 0 {
            last
        } else {
            EngineError::RetryExhausted {
                attempts,
                last: Box::new(last),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeType;
    use serde_json::json;

    #[test]
    fn test_policy_respects_caps() {
        let node = Node::new("a", "wf", NodeType::SendHttpRequest, json!({})).with_retry(50, 120_000);
        let policy = RetryPolicy::from_node(&node, &ExecutionSettings::default());
        assert_eq!(policy.retries, 10);
        assert_eq!(policy.delay_ms, 60_000);
    }

    #[test]
    fn test_attempt_accounting() {
        let policy = RetryPolicy::new(2, 10);
        assert_eq!(policy.max_attempts(), 3);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_exhausted_wraps_only_when_retried() {
        let bare = RetryPolicy::default().exhausted(1, EngineError::handler("down"));
        assert!(matches!(bare, EngineError::Handler(_)));

        let wrapped = RetryPolicy::new(2, 0).exhausted(3, EngineError::handler("down"));
        assert!(matches!(wrapped, EngineError::RetryExhausted { attempts: 3, .. }));
    }
}

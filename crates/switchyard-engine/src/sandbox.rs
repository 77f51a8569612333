//! Code sandbox interface
//!
//! `code_block` nodes run user source through a [`CodeSandbox`]. The engine
//! only defines the contract; the process-backed implementation lives with
//! the node handlers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::Result;

/// Resource limits for one sandboxed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Wall-clock limit, the run is killed when it elapses
    pub timeout_ms: u64,
    pub memory_limit_kb: u64,
    pub cpu_time_ms: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout_ms: constants::sandbox::TIMEOUT_MS,
            memory_limit_kb: constants::sandbox::MEMORY_LIMIT_KB,
            cpu_time_ms: constants::sandbox::CPU_TIME_MS,
        }
    }
}

impl SandboxLimits {
    /// Overlay the non-zero fields of a node's `{timeout, memoryLimit, cpuTime}`
    /// style overrides onto these limits
    pub fn with_overrides(mut self, timeout_ms: Option<u64>, memory_limit_kb: Option<u64>, cpu_time_ms: Option<u64>) -> Self {
        if let Some(v) = timeout_ms.filter(|v| *v > 0) {
            self.timeout_ms = v;
        }
        if let Some(v) = memory_limit_kb.filter(|v| *v > 0) {
            self.memory_limit_kb = v;
        }
        if let Some(v) = cpu_time_ms.filter(|v| *v > 0) {
            self.cpu_time_ms = v;
        }
        self
    }
}

/// Outcome of one sandboxed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CodeExecutionResult {
    pub success: bool,
    /// Captured stdout
    pub output: String,
    pub exit_code: Option<i32>,
    pub execution_time_ms: u64,
    /// Captured stderr or a runner message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
}

/// Executes untrusted source under resource limits
///
/// Implementations must enforce `limits` and must return no later than
/// `limits.timeout_ms` after the call (plus process teardown).
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    async fn execute(
        &self,
        source: &str,
        language: &str,
        limits: &SandboxLimits,
        stdin: Option<&str>,
    ) -> Result<CodeExecutionResult>;

    /// Languages this sandbox can run
    fn languages(&self) -> Vec<String>;
}

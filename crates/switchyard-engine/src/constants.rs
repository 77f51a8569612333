//! Engine-wide constants
//!
//! Defaults and limits shared by the engine and the node handlers.

/// Code sandbox limits
pub mod sandbox {
    /// Wall-clock limit for one code block run
    pub const TIMEOUT_MS: u64 = 1000;
    /// Address-space limit for one code block run (128 MB)
    pub const MEMORY_LIMIT_KB: u64 = 128 * 1024;
    /// CPU time limit for one code block run
    pub const CPU_TIME_MS: u64 = TIMEOUT_MS;
}

/// Retry bounds for action nodes
pub mod retry {
    /// Upper bound applied to a node's `retry_attempts`
    pub const MAX_ATTEMPTS: u32 = 10;
    /// Upper bound applied to a node's `retry_delay_ms`
    pub const MAX_DELAY_MS: u64 = 60_000;
}

/// Timeouts for outbound calls (in seconds)
pub mod timeouts {
    /// HTTP request timeout used by action nodes
    pub const HTTP_SECS: u64 = 30;
}

/// Expression evaluator limits
pub mod expression {
    /// Maximum nesting depth before evaluation is rejected
    pub const MAX_DEPTH: usize = 64;
    /// Maximum accepted expression source length in bytes
    pub const MAX_SOURCE_LEN: usize = 16 * 1024;
}

/// Reserved keys of the context view handed to templates and handlers
pub mod context_keys {
    pub const INPUT: &str = "input";
    pub const OUTPUT: &str = "output";
    pub const PREVIOUS: &str = "previous";
    pub const INDEX: &str = "$index";
    pub const ITEM: &str = "$item";
    pub const ITERATION: &str = "$iteration";
    pub const LOOP: &str = "$loop";
}

//! Resource limits for VM execution
//!
//! Limits are checked by the dispatch loop every `check_interval`
//! instructions. Exceeding one is fatal and bypasses exception handlers.

use serde::{Deserialize, Serialize};

/// Resource limits for VM execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum number of executed instructions
    pub max_instructions: Option<u64>,
    /// Maximum bytes held by payloads allocated during the run
    ///
    /// Usage is the growth of this thread's store counters since the run
    /// started. The counters are thread-local, so every VM, host function
    /// and embedder value on the same thread shares them: payloads they
    /// allocate while this VM runs count against its ceiling, and payloads
    /// they free offset it. Give each untrusted VM its own thread when the
    /// ceiling must be exact.
    pub max_memory_bytes: Option<usize>,
    /// Maximum number of live call frames
    pub max_call_depth: usize,
    /// Instructions between ceiling checks
    pub check_interval: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_instructions: None,
            max_memory_bytes: Some(512 * 1024 * 1024), // 512MB
            max_call_depth: 10_000,
            check_interval: 1024,
        }
    }
}

impl ResourceLimits {
    /// Create limits suitable for untrusted code
    pub fn sandboxed() -> Self {
        Self {
            max_instructions: Some(50_000_000),
            max_memory_bytes: Some(32 * 1024 * 1024), // 32MB
            max_call_depth: 1_000,
            check_interval: 256,
        }
    }

    /// Create limits suitable for testing
    pub fn testing() -> Self {
        Self {
            max_instructions: Some(1_000_000),
            max_memory_bytes: Some(4 * 1024 * 1024), // 4MB
            max_call_depth: 200,
            check_interval: 64,
        }
    }

    /// No instruction or memory ceiling.
    pub fn unlimited() -> Self {
        Self {
            max_instructions: None,
            max_memory_bytes: None,
            ..Self::default()
        }
    }
}

// error.rs — Error types for sandboxed execution.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which limit an execution ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    WallClock,
    Cpu,
    Memory,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LimitKind::WallClock => "wall-clock timeout",
            LimitKind::Cpu => "cpu",
            LimitKind::Memory => "memory",
        })
    }
}

#[derive(Debug, Error)]
pub enum SandboxError {
    /// No environment became free within the admission timeout.
    #[error("sandbox pool at capacity; gave up after {waited_ms} ms")]
    Busy { waited_ms: u64 },

    /// The environment hit a limit and was terminated. Not retried.
    #[error("{limit} limit exceeded: {detail}")]
    ResourceLimitExceeded { limit: LimitKind, detail: String },

    /// The execution backend failed (could not create, crashed mid-run).
    #[error("sandbox backend crashed after {attempts} attempt(s): {reason}")]
    Crash { attempts: u32, reason: String },

    /// The action cannot be turned into something runnable.
    #[error("cannot build execution for action: {0}")]
    InvalidSpec(String),

    /// The backend cannot honour the requested limits.
    #[error("backend cannot enforce requested limits: {0}")]
    Unsupported(String),

    /// The caller cancelled before an environment was acquired.
    #[error("execution cancelled")]
    Cancelled,
}

impl SandboxError {
    /// A crash raised inside a backend, before the executor counts attempts.
    pub fn crash(reason: impl Into<String>) -> Self {
        SandboxError::Crash {
            attempts: 1,
            reason: reason.into(),
        }
    }
}

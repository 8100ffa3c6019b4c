// error.rs — Error types for the audit subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create the audit log file.
    #[error("failed to open audit log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write or sync an entry. The entry must be treated as
    /// not recorded.
    #[error("failed to append audit entry: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Malformed JSON in the log, or an entry that cannot be encoded.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The hash chain is broken: a line was inserted, removed, or edited.
    #[error("integrity check failed at line {line}: expected hash {expected}, got {actual}")]
    IntegrityViolation {
        line: usize,
        expected: String,
        actual: String,
    },

    /// Sequence numbers are not strictly consecutive.
    #[error("sequence gap at line {line}: expected seq {expected}, got {actual}")]
    SequenceGap {
        line: usize,
        expected: u64,
        actual: u64,
    },

    /// A writer panicked while holding the log lock.
    #[error("audit log lock poisoned")]
    LockPoisoned,
}

// error.rs — Error types for the quarantine store.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuarantineError {
    /// No record exists for this content hash.
    #[error("no quarantined payload with hash {0}")]
    NotFound(String),

    /// The string is not a SHA-256 hex digest.
    #[error("invalid content hash '{0}'")]
    InvalidHash(String),

    /// The backing storage failed.
    #[error("quarantine storage unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A record on disk could not be read or written as JSON.
    #[error("quarantine record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored blob does not hash to its address.
    #[error("blob {0} is corrupt: content does not match its hash")]
    Corrupt(String),

    #[error("quarantine store lock poisoned")]
    LockPoisoned,
}

impl QuarantineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        QuarantineError::Unavailable {
            path: path.into(),
            source,
        }
    }
}

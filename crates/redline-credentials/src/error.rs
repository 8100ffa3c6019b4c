// error.rs — Error types for secret resolution.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    /// No grant permits this reference in this scope.
    #[error("access to secret '{name}' denied for {scope}")]
    AccessDenied { name: String, scope: String },

    /// The backend has no value for this reference.
    #[error("secret '{0}' not found")]
    NotFound(String),

    /// The value is too short to be scrubbed from output reliably.
    #[error("secret '{name}' is shorter than {min} bytes")]
    TooShort { name: String, min: usize },

    /// A grant pattern is not a valid glob.
    #[error("invalid secret grant pattern '{pattern}': {reason}")]
    InvalidGrant { pattern: String, reason: String },

    /// The credential backend itself failed.
    #[error("credential backend '{backend}' failed: {reason}")]
    Backend { backend: String, reason: String },
}

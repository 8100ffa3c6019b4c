// error.rs — Error types for the policy subsystem.

use thiserror::Error;

/// Errors that can occur during rule loading or policy evaluation.
///
/// Note that a Deny verdict is *not* an error: it is a normal Decision.
/// These variants describe inputs the engine refuses to judge at all.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The action payload exceeds the configured ceiling. Oversized payloads
    /// are rejected outright, never truncated.
    #[error("payload of {size} bytes exceeds the {limit}-byte ceiling")]
    PayloadTooLarge { size: usize, limit: usize },

    /// The action is structurally invalid (e.g., empty kind).
    #[error("malformed action: {0}")]
    MalformedAction(String),

    /// A rule pattern (regex or glob) failed to compile.
    #[error("invalid pattern '{pattern}' in rule '{rule}': {reason}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        reason: String,
    },

    /// Two rules in the same set share a name.
    #[error("duplicate rule name '{0}'")]
    DuplicateRule(String),

    /// The rule store could not be read.
    #[error("failed to load rule set from {path}: {source}")]
    LoadFailed {
        path: String,
        source: std::io::Error,
    },

    /// The rule set file is not valid YAML for the rule schema.
    #[error("failed to parse rule set: {0}")]
    ParseFailed(#[from] serde_yaml::Error),

    /// The active rule cache lock was poisoned by a panicking writer.
    #[error("rule cache lock poisoned")]
    LockPoisoned,
}

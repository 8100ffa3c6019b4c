// error.rs — The gateway's error taxonomy.
//
// Component errors are folded into kinds a caller can act on. Policy
// outcomes (a Deny verdict) are not errors at all; they come back as
// `SubmitOutcome::Denied`. `PolicyDenied` exists for the operator paths,
// where an action an operator denied is asked to run anyway.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use redline_audit::AuditError;
use redline_credentials::CredentialError;
use redline_policy::PolicyError;
use redline_quarantine::QuarantineError;
use redline_sandbox::{LimitKind, SandboxError};

/// A pipeline stage with its own timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PolicyEvaluation,
    SecretResolution,
    SandboxExecution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::PolicyEvaluation => "policy evaluation",
            Stage::SecretResolution => "secret resolution",
            Stage::SandboxExecution => "sandbox execution",
        })
    }
}

#[derive(Debug, Error)]
pub enum MediationError {
    #[error("payload of {size} bytes exceeds the {limit}-byte ceiling")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("malformed action: {0}")]
    MalformedAction(String),

    /// The action was denied and cannot proceed.
    #[error("action {action_id} denied: {reason}")]
    PolicyDenied { action_id: Uuid, reason: String },

    #[error("secret access denied: {0}")]
    SecretAccessDenied(String),

    /// No sandbox became free in time. Retryable.
    #[error("sandbox busy: no environment free after {waited_ms} ms")]
    SandboxBusy { waited_ms: u64 },

    /// The action hit a resource limit and was terminated. Not retried.
    #[error("resource limit exceeded ({limit}): {detail}")]
    ResourceLimitExceeded { limit: LimitKind, detail: String },

    /// The execution backend failed after bounded retries.
    #[error("sandbox crashed after {attempts} attempt(s): {reason}")]
    SandboxCrash { attempts: u32, reason: String },

    /// The action could not be turned into a sandboxed execution.
    #[error("action cannot be executed: {0}")]
    Unexecutable(String),

    /// No durable audit record could be written; the request fails.
    #[error("audit write failed: {0}")]
    AuditWriteFailed(String),

    /// The quarantine store could not accept the payload. The action is
    /// never executed instead.
    #[error("quarantine store unavailable: {0}")]
    QuarantineStoreUnavailable(String),

    #[error("{stage} timed out after {timeout_ms} ms")]
    StageTimeout { stage: Stage, timeout_ms: u64 },

    #[error("action {0} was cancelled")]
    Cancelled(Uuid),

    #[error("no pending action with handle {0}")]
    PendingNotFound(String),

    /// The pending action is not in a state that allows the request.
    #[error("pending action {handle} is {state}, not {expected}")]
    PendingNotApproved {
        handle: String,
        state: String,
        expected: String,
    },

    #[error("pending store error at {path}: {reason}")]
    PendingStore { path: PathBuf, reason: String },

    /// Rule loading or other policy infrastructure failure.
    #[error("policy engine error: {0}")]
    Policy(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MediationError {
    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediationError::SandboxBusy { .. } | MediationError::SandboxCrash { .. }
        )
    }

    /// Whether the action failed before anything ran, so an operator's
    /// approval for it still stands.
    pub fn is_before_execution(&self) -> bool {
        matches!(
            self,
            MediationError::SandboxBusy { .. }
                | MediationError::SecretAccessDenied(_)
                | MediationError::StageTimeout {
                    stage: Stage::SecretResolution,
                    ..
                }
        )
    }

    /// Whether this is a judgement about the action rather than a failure
    /// of the system to reach one.
    pub fn is_policy_outcome(&self) -> bool {
        matches!(
            self,
            MediationError::PolicyDenied { .. }
                | MediationError::PayloadTooLarge { .. }
                | MediationError::MalformedAction(_)
                | MediationError::SecretAccessDenied(_)
        )
    }

    /// Stable snake_case name, recorded in audit entries.
    pub fn kind(&self) -> &'static str {
        match self {
            MediationError::PayloadTooLarge { .. } => "payload_too_large",
            MediationError::MalformedAction(_) => "malformed_action",
            MediationError::PolicyDenied { .. } => "policy_denied",
            MediationError::SecretAccessDenied(_) => "secret_access_denied",
            MediationError::SandboxBusy { .. } => "sandbox_busy",
            MediationError::ResourceLimitExceeded { .. } => "resource_limit_exceeded",
            MediationError::SandboxCrash { .. } => "sandbox_crash",
            MediationError::Unexecutable(_) => "unexecutable",
            MediationError::AuditWriteFailed(_) => "audit_write_failed",
            MediationError::QuarantineStoreUnavailable(_) => "quarantine_store_unavailable",
            MediationError::StageTimeout { .. } => "stage_timeout",
            MediationError::Cancelled(_) => "cancelled",
            MediationError::PendingNotFound(_) => "pending_not_found",
            MediationError::PendingNotApproved { .. } => "pending_not_approved",
            MediationError::PendingStore { .. } => "pending_store",
            MediationError::Policy(_) => "policy",
            MediationError::Config(_) => "config",
        }
    }
}

impl From<PolicyError> for MediationError {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::PayloadTooLarge { size, limit } => {
                MediationError::PayloadTooLarge { size, limit }
            }
            PolicyError::MalformedAction(msg) => MediationError::MalformedAction(msg),
            other => MediationError::Policy(other.to_string()),
        }
    }
}

impl From<CredentialError> for MediationError {
    fn from(e: CredentialError) -> Self {
        // Missing, forbidden, and backend failures all fail the action hard.
        MediationError::SecretAccessDenied(e.to_string())
    }
}

impl From<AuditError> for MediationError {
    fn from(e: AuditError) -> Self {
        MediationError::AuditWriteFailed(e.to_string())
    }
}

impl From<QuarantineError> for MediationError {
    fn from(e: QuarantineError) -> Self {
        MediationError::QuarantineStoreUnavailable(e.to_string())
    }
}

impl MediationError {
    pub(crate) fn from_sandbox(e: SandboxError, action_id: Uuid) -> Self {
        match e {
            SandboxError::Busy { waited_ms } => MediationError::SandboxBusy { waited_ms },
            SandboxError::ResourceLimitExceeded { limit, detail } => {
                MediationError::ResourceLimitExceeded { limit, detail }
            }
            SandboxError::Crash { attempts, reason } => {
                MediationError::SandboxCrash { attempts, reason }
            }
            SandboxError::InvalidSpec(msg) | SandboxError::Unsupported(msg) => {
                MediationError::Unexecutable(msg)
            }
            SandboxError::Cancelled => MediationError::Cancelled(action_id),
        }
    }
}

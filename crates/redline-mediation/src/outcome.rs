// outcome.rs — What `submit` hands back to the agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use redline_policy::Decision;
use redline_sandbox::ExecutionResult;

/// Why an action was not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub action_id: Uuid,
    pub reason: String,
    pub decision: Decision,
}

/// Proof that a payload was diverted to quarantine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineReceipt {
    pub action_id: Uuid,
    pub content_hash: String,
    pub expires_at: DateTime<Utc>,
    /// How many quarantined actions share this payload.
    pub reference_count: u64,
    pub decision: Decision,
}

/// Handle for an action awaiting operator approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingHandle {
    pub handle: Uuid,
    pub action_id: Uuid,
    pub decision: Decision,
}

/// Result of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Executed in the sandbox. Output has already been sanitized. An
    /// execution cancelled mid-run comes back here with a `Cancelled`
    /// exit status.
    Allowed(ExecutionResult),
    Denied(Rejection),
    Quarantined(QuarantineReceipt),
    Pending(PendingHandle),
}

impl SubmitOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SubmitOutcome::Allowed(_) => "allowed",
            SubmitOutcome::Denied(_) => "denied",
            SubmitOutcome::Quarantined(_) => "quarantined",
            SubmitOutcome::Pending(_) => "pending",
        }
    }

    pub fn execution(&self) -> Option<&ExecutionResult> {
        match self {
            SubmitOutcome::Allowed(result) => Some(result),
            _ => None,
        }
    }
}

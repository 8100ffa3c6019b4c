// event.rs — Audit entry data model.
//
// One AuditEntry is one line in the JSONL log. It references the action by
// id and payload hash (the payload itself is never stored), carries the
// Decision that governed it, and records how the pipeline ended. Secret
// references are recorded by name only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use redline_policy::{Action, Decision, Verdict};

use crate::hasher;

/// Captured (and already sanitized) result of a sandboxed execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Process exit code; `None` when terminated by a signal.
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Output exceeded the capture limit and carries a truncation marker.
    pub truncated: bool,
    pub duration_ms: u64,
    /// Number of secret values and credential patterns scrubbed.
    #[serde(default)]
    pub redactions: usize,
}

/// How a pipeline stage ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Denied by policy (or by an operator); nothing ran.
    Rejected,
    /// Payload diverted to the quarantine store.
    Quarantined { content_hash: String },
    /// Awaiting operator resolution.
    Pending { handle: String },
    /// An operator resolved a pending action. The new Decision is attached.
    Resolved,
    /// Sandboxed execution completed (any exit status).
    Executed(ExecutionSummary),
    /// Execution was attempted and failed (limit exceeded, crash, secret
    /// denied, busy pool).
    ExecutionFailed { error_kind: String, error: String },
    /// An approved action could not start (busy pool, secrets unavailable).
    /// The approval stands and the action may be executed again.
    Deferred { error_kind: String, error: String },
    /// The caller cancelled the action.
    Cancelled,
    /// The action could not be judged at all (malformed, oversized, timeout).
    Failed { error_kind: String, error: String },
}

impl AuditOutcome {
    /// Whether this outcome ends the action's lifecycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            AuditOutcome::Pending { .. } | AuditOutcome::Resolved | AuditOutcome::Deferred { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            AuditOutcome::Rejected => "rejected",
            AuditOutcome::Quarantined { .. } => "quarantined",
            AuditOutcome::Pending { .. } => "pending",
            AuditOutcome::Resolved => "resolved",
            AuditOutcome::Executed(_) => "executed",
            AuditOutcome::ExecutionFailed { .. } => "execution_failed",
            AuditOutcome::Deferred { .. } => "deferred",
            AuditOutcome::Cancelled => "cancelled",
            AuditOutcome::Failed { .. } => "failed",
        }
    }
}

/// A single audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic sequence number, assigned by the log on append.
    #[serde(default)]
    pub seq: u64,

    pub entry_id: Uuid,

    /// When the entry was created (UTC).
    pub timestamp: DateTime<Utc>,

    pub action_id: Uuid,

    /// Session identity that proposed the action.
    pub requested_by: String,

    pub kind: String,

    /// SHA-256 of the canonical payload bytes.
    pub payload_hash: Option<String>,

    pub payload_size: Option<usize>,

    /// Secret reference names (never values).
    #[serde(default)]
    pub secret_refs: Vec<String>,

    pub decision: Option<Decision>,

    #[serde(flatten)]
    pub outcome: AuditOutcome,

    /// Hash of the previous JSON line. `None` for the first entry.
    pub previous_hash: Option<String>,

    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl AuditEntry {
    /// Start an entry describing `action`.
    pub fn for_action(action: &Action, outcome: AuditOutcome) -> Self {
        let payload = action.payload_bytes();
        Self {
            seq: 0,
            entry_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action_id: action.id(),
            requested_by: action.requested_by().to_string(),
            kind: action.kind().to_string(),
            payload_hash: Some(hasher::hash_bytes(&payload)),
            payload_size: Some(payload.len()),
            secret_refs: action.secret_refs().iter().map(|r| r.to_string()).collect(),
            decision: None,
            outcome,
            previous_hash: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn verdict(&self) -> Option<Verdict> {
        self.decision.as_ref().map(|d| d.verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redline_policy::{ActionKind, SecretRef};
    use serde_json::json;

    #[test]
    fn entry_records_hash_not_payload() {
        let action = Action::new(ActionKind::ShellExec, json!("echo hunter2"), "s-1");
        let entry = AuditEntry::for_action(&action, AuditOutcome::Rejected);
        let line = serde_json::to_string(&entry).unwrap();
        assert!(!line.contains("hunter2"));
        assert_eq!(entry.payload_hash, Some(hasher::hash_str("echo hunter2")));
        assert_eq!(entry.payload_size, Some(12));
    }

    #[test]
    fn secret_refs_recorded_by_name() {
        let action = Action::new(ActionKind::NetworkCall, json!({"url": "https://x"}), "s")
            .with_secret(SecretRef::new("github/token", "GH_TOKEN").with_version("2"));
        let entry = AuditEntry::for_action(&action, AuditOutcome::Cancelled);
        assert_eq!(entry.secret_refs, vec!["github/token@2"]);
    }

    #[test]
    fn outcome_is_flattened_with_tag() {
        let action = Action::new(ActionKind::ShellExec, json!("ls"), "s");
        let entry = AuditEntry::for_action(
            &action,
            AuditOutcome::Quarantined {
                content_hash: "abc".to_string(),
            },
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["outcome"], "quarantined");
        assert_eq!(value["content_hash"], "abc");

        let restored: AuditEntry = serde_json::from_value(value).unwrap();
        assert_eq!(restored.outcome, entry.outcome);
    }

    #[test]
    fn pending_and_resolved_are_not_terminal() {
        assert!(!AuditOutcome::Pending {
            handle: "h".to_string()
        }
        .is_terminal());
        assert!(!AuditOutcome::Resolved.is_terminal());
        assert!(AuditOutcome::Cancelled.is_terminal());
        assert!(AuditOutcome::Rejected.is_terminal());
    }
}

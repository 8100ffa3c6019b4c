// sink.rs — The AuditSink trait and an in-memory implementation.
//
// The gateway writes through `AuditSink` so tests and embedders can swap the
// JSONL file for memory without touching pipeline code. Implementations must
// assign strictly increasing sequence numbers and must not return Ok until
// the entry is recorded.

use std::sync::Mutex;

use uuid::Uuid;

use crate::error::AuditError;
use crate::event::AuditEntry;
use crate::hasher;

/// Destination for audit entries. `append` returns the assigned seq.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: AuditEntry) -> Result<u64, AuditError>;
}

/// In-memory audit log with the same sequencing and chaining as
/// [`AuditLog`](crate::AuditLog).
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Entries referencing one action.
    pub fn for_action(&self, action_id: Uuid) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.action_id == action_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, mut entry: AuditEntry) -> Result<u64, AuditError> {
        let mut entries = self.entries.lock().map_err(|_| AuditError::LockPoisoned)?;
        let previous = match entries.last() {
            Some(last) => Some(hasher::hash_str(&serde_json::to_string(last)?)),
            None => None,
        };
        entry.seq = entries.len() as u64 + 1;
        entry.previous_hash = previous;
        let seq = entry.seq;
        entries.push(entry);
        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditOutcome;
    use redline_policy::{Action, ActionKind};
    use serde_json::json;

    #[test]
    fn memory_log_sequences_and_filters() {
        let log = MemoryAuditLog::new();
        let a = Action::new(ActionKind::ShellExec, json!("ls"), "s");
        let b = Action::new(ActionKind::ShellExec, json!("pwd"), "s");

        assert_eq!(log.append(AuditEntry::for_action(&a, AuditOutcome::Rejected)).unwrap(), 1);
        assert_eq!(log.append(AuditEntry::for_action(&b, AuditOutcome::Rejected)).unwrap(), 2);
        assert_eq!(log.append(AuditEntry::for_action(&a, AuditOutcome::Cancelled)).unwrap(), 3);

        assert_eq!(log.len(), 3);
        assert_eq!(log.for_action(a.id()).len(), 2);
        let entries = log.entries();
        assert!(entries[0].previous_hash.is_none());
        assert!(entries[2].previous_hash.is_some());
    }
}

// pending.rs — Persistent storage for actions awaiting an operator.
//
// Stores pending actions as JSON files in .redline/pending/<handle>.json,
// mirrored in memory. An entry records the original Decision and, once an
// operator acts, the resolution Decision. Neither is ever overwritten: a
// resolution is a new Decision next to the original.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use redline_policy::{Action, Decision};

use crate::error::MediationError;

/// Where a pending action is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingState {
    /// Waiting for an operator.
    Awaiting,
    /// Approved; may be executed once.
    Approved,
    /// Claimed by one execution. Goes back to Approved if the action could
    /// not start.
    Executing,
    /// Denied by an operator. Terminal.
    Denied,
    /// Approved and run. Terminal.
    Executed,
    /// Withdrawn before it ran. Terminal.
    Cancelled,
}

impl PendingState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PendingState::Denied | PendingState::Executed | PendingState::Cancelled
        )
    }
}

impl std::fmt::Display for PendingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PendingState::Awaiting => "awaiting",
            PendingState::Approved => "approved",
            PendingState::Executing => "executing",
            PendingState::Denied => "denied",
            PendingState::Executed => "executed",
            PendingState::Cancelled => "cancelled",
        })
    }
}

/// A persisted pending action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub handle: Uuid,
    pub action: Action,
    /// The PendingApproval decision from the policy engine.
    pub decision: Decision,
    /// The operator's decision, once made.
    pub resolution: Option<Decision>,
    pub state: PendingState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn new(action: Action, decision: Decision) -> Self {
        let now = Utc::now();
        Self {
            handle: Uuid::new_v4(),
            action,
            decision,
            resolution: None,
            state: PendingState::Awaiting,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage for pending actions.
pub struct PendingStore {
    dir: Option<PathBuf>,
    entries: Mutex<HashMap<Uuid, PendingAction>>,
}

impl PendingStore {
    /// Open (or create) a directory-backed store, loading existing entries.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, MediationError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| store_error(&dir, e))?;

        let mut entries = HashMap::new();
        for entry in fs::read_dir(&dir).map_err(|e| store_error(&dir, e))? {
            let path = entry.map_err(|e| store_error(&dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let json = fs::read_to_string(&path).map_err(|e| store_error(&path, e))?;
                match serde_json::from_str::<PendingAction>(&json) {
                    Ok(pending) => {
                        entries.insert(pending.handle, pending);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable pending entry");
                    }
                }
            }
        }

        Ok(Self {
            dir: Some(dir),
            entries: Mutex::new(entries),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            dir: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Persist a new or updated entry.
    pub fn save(&self, pending: &PendingAction) -> Result<(), MediationError> {
        let mut entries = self.lock()?;
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{}.json", pending.handle));
            let json = serde_json::to_string_pretty(pending).map_err(|e| store_error(&path, e))?;
            fs::write(&path, json).map_err(|e| store_error(&path, e))?;
        }
        entries.insert(pending.handle, pending.clone());
        Ok(())
    }

    pub fn load(&self, handle: Uuid) -> Result<PendingAction, MediationError> {
        self.lock()?
            .get(&handle)
            .cloned()
            .ok_or_else(|| MediationError::PendingNotFound(handle.to_string()))
    }

    /// Find the entry holding a given action.
    pub fn find_by_action(&self, action_id: Uuid) -> Result<Option<PendingAction>, MediationError> {
        Ok(self
            .lock()?
            .values()
            .find(|p| p.action.id() == action_id)
            .cloned())
    }

    /// All entries, oldest first.
    pub fn list(&self) -> Result<Vec<PendingAction>, MediationError> {
        let mut all: Vec<_> = self.lock()?.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.handle.cmp(&b.handle)));
        Ok(all)
    }

    /// Apply `change` to the entry if its current state is `expected`.
    ///
    /// The check and the write happen under one lock, so two operators
    /// racing on one handle cannot both succeed.
    pub fn transition(
        &self,
        handle: Uuid,
        expected: PendingState,
        change: impl FnOnce(&mut PendingAction),
    ) -> Result<PendingAction, MediationError> {
        let mut entries = self.lock()?;
        let current = entries
            .get(&handle)
            .ok_or_else(|| MediationError::PendingNotFound(handle.to_string()))?;
        if current.state != expected {
            return Err(MediationError::PendingNotApproved {
                handle: handle.to_string(),
                state: current.state.to_string(),
                expected: expected.to_string(),
            });
        }

        let mut updated = current.clone();
        change(&mut updated);
        updated.updated_at = Utc::now();

        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{handle}.json"));
            let json = serde_json::to_string_pretty(&updated).map_err(|e| store_error(&path, e))?;
            fs::write(&path, json).map_err(|e| store_error(&path, e))?;
        }
        entries.insert(handle, updated.clone());
        Ok(updated)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, PendingAction>>, MediationError> {
        self.entries.lock().map_err(|_| MediationError::PendingStore {
            path: self.dir.clone().unwrap_or_default(),
            reason: "lock poisoned".to_string(),
        })
    }
}

fn store_error(path: &Path, e: impl std::fmt::Display) -> MediationError {
    MediationError::PendingStore {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

// record.rs — Quarantine record metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cap on `QuarantineRecord::action_ids`.
pub const MAX_TRACKED_ACTIONS: usize = 64;

/// Metadata for one quarantined payload.
///
/// One record per content hash. Re-quarantining the same bytes increments
/// `reference_count`, appends the action to `action_ids`, and refreshes
/// `action_id` and `expires_at` (last writer wins on metadata). Only the
/// most recent [`MAX_TRACKED_ACTIONS`] ids are kept; the audit log holds
/// the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub content_hash: String,
    /// The most recent action that quarantined this payload.
    pub action_id: Uuid,
    /// Recent actions that quarantined this payload, oldest first.
    #[serde(default)]
    pub action_ids: Vec<Uuid>,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub retrieval_count: u64,
    pub reference_count: u64,
    pub size_bytes: usize,
}

impl QuarantineRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// store.rs — QuarantineStore: records plus content-addressed blobs.
//
// Records live in `<records_dir>/<content_hash>.json` (pretty JSON, one file
// per hash) when the store is disk-backed, and are mirrored in memory. All
// record mutation happens under one mutex: reference counts increment
// atomically and concurrent puts of the same bytes produce one record.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::artifact::{content_hash, validate_hash, ArtifactStore, FsArtifactStore, MemoryArtifactStore};
use crate::error::QuarantineError;
use crate::record::{QuarantineRecord, MAX_TRACKED_ACTIONS};

/// Default retention window for quarantined payloads.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

pub struct QuarantineStore {
    artifacts: Arc<dyn ArtifactStore>,
    records_dir: Option<PathBuf>,
    records: Mutex<HashMap<String, QuarantineRecord>>,
    retention: Duration,
}

impl QuarantineStore {
    /// Open a disk-backed store rooted at `dir` (`blobs/` and `records/`).
    pub fn open(dir: impl AsRef<Path>, retention: Duration) -> Result<Self, QuarantineError> {
        let dir = dir.as_ref();
        let artifacts = Arc::new(FsArtifactStore::new(dir.join("blobs"))?);
        Self::with_artifacts(artifacts, Some(dir.join("records")), retention)
    }

    /// A store that keeps everything in memory.
    pub fn in_memory(retention: Duration) -> Self {
        Self {
            artifacts: Arc::new(MemoryArtifactStore::new()),
            records_dir: None,
            records: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// A store over a custom artifact backend. When `records_dir` is set,
    /// existing records are loaded from it.
    pub fn with_artifacts(
        artifacts: Arc<dyn ArtifactStore>,
        records_dir: Option<PathBuf>,
        retention: Duration,
    ) -> Result<Self, QuarantineError> {
        let mut records = HashMap::new();
        if let Some(dir) = &records_dir {
            fs::create_dir_all(dir).map_err(|e| QuarantineError::io(dir, e))?;
            for record in load_records(dir)? {
                records.insert(record.content_hash.clone(), record);
            }
        }
        Ok(Self {
            artifacts,
            records_dir,
            records: Mutex::new(records),
            retention,
        })
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Quarantine `payload` on behalf of `action_id`.
    ///
    /// Identical payloads map to the same hash and the same record; the
    /// returned record shows the updated reference count.
    pub fn put(&self, payload: &[u8], action_id: Uuid) -> Result<QuarantineRecord, QuarantineError> {
        self.put_at(payload, action_id, Utc::now())
    }

    /// `put` with an explicit clock.
    pub fn put_at(
        &self,
        payload: &[u8],
        action_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<QuarantineRecord, QuarantineError> {
        let hash = content_hash(payload);
        let mut records = self.lock()?;

        // A missing blob under an existing record is rewritten; the hash
        // guarantees the bytes are the same.
        self.artifacts.put_if_absent(&hash, payload)?;

        let record = match records.get(&hash) {
            Some(existing) => {
                let mut updated = existing.clone();
                updated.reference_count += 1;
                updated.action_id = action_id;
                if !updated.action_ids.contains(&action_id) {
                    updated.action_ids.push(action_id);
                    let excess = updated.action_ids.len().saturating_sub(MAX_TRACKED_ACTIONS);
                    updated.action_ids.drain(..excess);
                }
                updated.expires_at = now + self.retention;
                updated
            }
            None => QuarantineRecord {
                content_hash: hash.clone(),
                action_id,
                action_ids: vec![action_id],
                stored_at: now,
                expires_at: now + self.retention,
                retrieval_count: 0,
                reference_count: 1,
                size_bytes: payload.len(),
            },
        };

        self.persist(&record)?;
        records.insert(hash.clone(), record.clone());

        tracing::info!(
            content_hash = %hash,
            action_id = %action_id,
            reference_count = record.reference_count,
            size_bytes = record.size_bytes,
            "payload quarantined"
        );
        Ok(record)
    }

    /// Retrieve quarantined bytes. Bytes only; nothing is executed.
    pub fn get(&self, hash: &str) -> Result<Vec<u8>, QuarantineError> {
        validate_hash(hash)?;
        let mut records = self.lock()?;
        let mut record = records
            .get(hash)
            .cloned()
            .ok_or_else(|| QuarantineError::NotFound(hash.to_string()))?;

        let bytes = self
            .artifacts
            .get(hash)?
            .ok_or_else(|| QuarantineError::NotFound(hash.to_string()))?;
        if content_hash(&bytes) != hash {
            return Err(QuarantineError::Corrupt(hash.to_string()));
        }

        record.retrieval_count += 1;
        self.persist(&record)?;
        records.insert(hash.to_string(), record);
        Ok(bytes)
    }

    /// Metadata for one hash, without counting a retrieval.
    pub fn record(&self, hash: &str) -> Result<QuarantineRecord, QuarantineError> {
        validate_hash(hash)?;
        self.lock()?
            .get(hash)
            .cloned()
            .ok_or_else(|| QuarantineError::NotFound(hash.to_string()))
    }

    /// All records, oldest first.
    pub fn list(&self) -> Result<Vec<QuarantineRecord>, QuarantineError> {
        let mut records: Vec<_> = self.lock()?.values().cloned().collect();
        records.sort_by(|a, b| {
            a.stored_at
                .cmp(&b.stored_at)
                .then_with(|| a.content_hash.cmp(&b.content_hash))
        });
        Ok(records)
    }

    /// Remove every record (and blob) whose retention has passed.
    /// Returns the reclaimed hashes.
    pub fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, QuarantineError> {
        let mut records = self.lock()?;
        let expired: Vec<String> = records
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.content_hash.clone())
            .collect();

        for hash in &expired {
            self.artifacts.delete(hash)?;
            if let Some(dir) = &self.records_dir {
                let path = record_path(dir, hash);
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(QuarantineError::io(path, e)),
                }
            }
            records.remove(hash);
        }

        if !expired.is_empty() {
            tracing::info!(reclaimed = expired.len(), "expired quarantine records reclaimed");
        }
        Ok(expired)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, QuarantineRecord>>, QuarantineError> {
        self.records.lock().map_err(|_| QuarantineError::LockPoisoned)
    }

    fn persist(&self, record: &QuarantineRecord) -> Result<(), QuarantineError> {
        let Some(dir) = &self.records_dir else {
            return Ok(());
        };
        let path = record_path(dir, &record.content_hash);
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json).map_err(|e| QuarantineError::io(path, e))
    }
}

fn record_path(dir: &Path, hash: &str) -> PathBuf {
    dir.join(format!("{}.json", hash))
}

fn load_records(dir: &Path) -> Result<Vec<QuarantineRecord>, QuarantineError> {
    let mut records = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| QuarantineError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| QuarantineError::io(dir, e))?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            let json = fs::read_to_string(&path).map_err(|e| QuarantineError::io(&path, e))?;
            match serde_json::from_str::<QuarantineRecord>(&json) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable quarantine record")
                }
            }
        }
    }
    Ok(records)
}

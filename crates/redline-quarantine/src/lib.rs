//! # redline-quarantine
//!
//! Immutable, content-addressed holding area for payloads the policy engine
//! diverted. Identical payloads share one blob and one record whose
//! reference count tracks how many actions produced it.
//!
//! Retrieval yields bytes only. Nothing in this crate executes, and blobs are
//! written read-only. Re-running a quarantined payload means submitting a new
//! action through the gateway.
//!
//! Records expire after a retention window (30 days by default). Expiry is
//! performed by [`QuarantineStore::reclaim_expired`], normally driven by a
//! background task, never as a side effect of `put` or `get`.

pub mod artifact;
pub mod error;
pub mod record;
pub mod store;

pub use artifact::{content_hash, ArtifactStore, FsArtifactStore, MemoryArtifactStore};
pub use error::QuarantineError;
pub use record::{QuarantineRecord, MAX_TRACKED_ACTIONS};
pub use store::{QuarantineStore, DEFAULT_RETENTION_DAYS};

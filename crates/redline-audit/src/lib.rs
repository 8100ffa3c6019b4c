//! # redline-audit
//!
//! Append-only audit log for Redline.
//!
//! Every mediated action leaves an [`AuditEntry`] in a JSONL (JSON Lines)
//! file: what was proposed, which [`Decision`](redline_policy::Decision) it
//! received, and how it ended. Entries carry a monotonic sequence number and
//! a SHA-256 link to the previous line, so insertion, deletion, or editing
//! is detectable with [`AuditLog::verify_chain`].
//!
//! There is no update or delete operation. Retention is an out-of-band
//! administrative concern.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use redline_audit::{AuditEntry, AuditLog, AuditOutcome, AuditSink};
//! use redline_policy::{Action, ActionKind};
//!
//! let log = AuditLog::open("/tmp/audit.jsonl").unwrap();
//! let action = Action::new(ActionKind::ShellExec, serde_json::json!("ls"), "session-1");
//! let seq = log.append(AuditEntry::for_action(&action, AuditOutcome::Rejected)).unwrap();
//! assert_eq!(seq, 1);
//! ```

pub mod error;
pub mod event;
pub mod hasher;
pub mod log;
pub mod sink;

pub use error::AuditError;
pub use event::{AuditEntry, AuditOutcome, ExecutionSummary};
pub use log::AuditLog;
pub use sink::{AuditSink, MemoryAuditLog};

//! # redline-mediation
//!
//! The mediation gateway: every action an agent proposes enters here and
//! leaves with exactly one of four outcomes.
//!
//! ```text
//! Agent ─submit─▶ MediationGateway ─▶ PolicyEngine ─▶ Decision
//!                        │
//!       ┌────────────────┼────────────────┬─────────────────┐
//!     Allow            Deny          Quarantine      PendingApproval
//!       │                │                │                 │
//!  SecretBroker          │         QuarantineStore     PendingStore
//!  SandboxExecutor       │                │                 │
//!       └────────────────┴──────▶ AuditLog ◀────────────────┘
//! ```
//!
//! The audit entry is written (durably) before `submit` returns. If it
//! cannot be written, the request fails with
//! [`MediationError::AuditWriteFailed`] regardless of what ran.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use redline_mediation::{GatewayConfig, MediationGateway, SubmitOutcome};
//! use redline_policy::{Action, ActionKind};
//!
//! # async fn demo() -> Result<(), redline_mediation::MediationError> {
//! let config = GatewayConfig::load(".")?;
//! let gateway = MediationGateway::from_config(&config)?;
//! let action = Action::new(ActionKind::ShellExec, serde_json::json!("rm -rf /"), "session-1");
//! match gateway.submit(action).await? {
//!     SubmitOutcome::Denied(rejection) => println!("denied: {}", rejection.reason),
//!     other => println!("{}", other.label()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod outcome;
pub mod pending;
pub mod sanitize;

pub use config::{BackendKind, GatewayConfig, Settings};
pub use error::{MediationError, Stage};
pub use gateway::{CancelOutcome, GatewayParts, MediationGateway, StageTimeouts};
pub use outcome::{PendingHandle, QuarantineReceipt, Rejection, SubmitOutcome};
pub use pending::{PendingAction, PendingState, PendingStore};
pub use sanitize::{OutputSanitizer, Sanitized};

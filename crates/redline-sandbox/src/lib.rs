//! # redline-sandbox
//!
//! Runs approved actions inside isolated, resource-bounded environments.
//!
//! The [`SandboxExecutor`] is an adapter over an [`ExecutionBackend`]
//! (create / run / destroy). It owns admission control: a fixed pool of
//! environments guarded by a semaphore, so a submission beyond capacity
//! waits up to the admission timeout and then fails with
//! [`SandboxError::Busy`] instead of overcommitting.
//!
//! Guarantees, on every backend:
//!
//! - one fresh environment per attempt, destroyed on every exit path
//!   (success, failure, timeout, cancellation);
//! - exceeding a limit kills the environment and yields
//!   [`SandboxError::ResourceLimitExceeded`], never partial output;
//! - output capture is bounded, and oversized output is truncated with a
//!   visible marker;
//! - backend crashes are retried a bounded number of times with backoff.
//!
//! Two backends ship: [`ProcessBackend`] (scratch directory, cleared
//! environment, `ulimit`, optional network namespace) and [`DockerBackend`]
//! (the `docker` CLI with no network, capped memory and CPU, read-only root,
//! all capabilities dropped).

pub mod backend;
mod capture;
pub mod docker;
pub mod error;
pub mod executor;
pub mod limits;
pub mod process;
pub mod spec;

pub use backend::{EnvironmentHandle, ExecutionBackend, RawOutput};
pub use docker::DockerBackend;
pub use error::{LimitKind, SandboxError};
pub use executor::{ExecutionResult, ExecutorConfig, ExitStatus, ResourceUsage, SandboxExecutor};
pub use limits::{FilesystemScope, LimitedBuffer, NetworkPolicy, ResourceLimits, TRUNCATION_MARKER};
pub use process::ProcessBackend;
pub use spec::ExecutionSpec;
pub use tokio_util::sync::CancellationToken;

// backend.rs — The execution backend contract.
//
// A backend is any isolation technology that can create an environment with
// limits, run one process in it, and destroy it. The executor calls
// `destroy` on every path once `create` has succeeded, including when the
// `run` future is dropped on cancellation.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use redline_credentials::ResolvedSecrets;

use crate::error::SandboxError;
use crate::limits::ResourceLimits;
use crate::spec::ExecutionSpec;

/// An environment created by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentHandle {
    /// Backend-specific id (scratch directory name, container id).
    pub id: String,
    /// Host-side scratch directory, when the backend uses one.
    pub scratch: Option<PathBuf>,
}

/// What came back from one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    /// `Some(code)` on normal exit; `None` when killed by a signal.
    pub exit_code: Option<i32>,
    /// Terminating signal, when there was one.
    pub signal: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub truncated: bool,
    pub elapsed: Duration,
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Create a fresh environment honouring `limits`.
    async fn create(&self, limits: &ResourceLimits) -> Result<EnvironmentHandle, SandboxError>;

    /// Run `spec` in `env`, injecting `secrets` as environment variables.
    ///
    /// Must enforce `limits.timeout` and output bounds itself, returning
    /// `ResourceLimitExceeded` rather than partial output.
    async fn run(
        &self,
        env: &EnvironmentHandle,
        spec: &ExecutionSpec,
        secrets: &ResolvedSecrets,
        limits: &ResourceLimits,
    ) -> Result<RawOutput, SandboxError>;

    /// Tear the environment down, wiping anything written into it.
    async fn destroy(&self, env: &EnvironmentHandle) -> Result<(), SandboxError>;
}

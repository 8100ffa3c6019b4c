// process.rs — ProcessBackend: local child processes in scratch directories.
//
// Each environment is a fresh directory under the backend root. The child
// runs with a cleared environment, the scratch directory as HOME, TMPDIR
// and working directory, and `ulimit` caps on virtual memory and CPU time.
// With `network = none` the child is started in a new network namespace via
// `unshare`; host allowlists cannot be enforced here and are refused.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use redline_credentials::ResolvedSecrets;

use crate::backend::{EnvironmentHandle, ExecutionBackend, RawOutput};
use crate::capture::run_child;
use crate::error::SandboxError;
use crate::limits::{FilesystemScope, NetworkPolicy, ResourceLimits};
use crate::spec::{check_relative, ExecutionSpec};

const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

pub struct ProcessBackend {
    root: PathBuf,
    isolate_network: bool,
    path_env: String,
}

impl ProcessBackend {
    /// Environments are created under `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            isolate_network: true,
            path_env: DEFAULT_PATH.to_string(),
        }
    }

    /// Whether `network = none` is enforced with `unshare --net`. When
    /// disabled, such limits are refused instead of silently ignored.
    pub fn with_network_isolation(mut self, enabled: bool) -> Self {
        self.isolate_network = enabled;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path_env = path.into();
        self
    }

    /// The argv that applies rlimits, then execs the requested program.
    fn argv(&self, spec: &ExecutionSpec, limits: &ResourceLimits) -> Vec<String> {
        let script = format!(
            "ulimit -v {} 2>/dev/null; ulimit -t {}; exec \"$0\" \"$@\"",
            limits.memory_bytes / 1024,
            limits.cpu_seconds()
        );
        let mut argv = Vec::new();
        if limits.network == NetworkPolicy::None {
            argv.extend(["unshare", "--net", "--map-root-user", "--"].map(String::from));
        }
        argv.extend(["sh".to_string(), "-c".to_string(), script]);
        argv.push(spec.program.clone());
        argv.extend(spec.args.iter().cloned());
        argv
    }
}

fn scratch_of(env: &EnvironmentHandle) -> Result<&Path, SandboxError> {
    env.scratch
        .as_deref()
        .ok_or_else(|| SandboxError::crash("process environment has no scratch directory"))
}

#[async_trait]
impl ExecutionBackend for ProcessBackend {
    fn name(&self) -> &str {
        "process"
    }

    async fn create(&self, limits: &ResourceLimits) -> Result<EnvironmentHandle, SandboxError> {
        match &limits.network {
            NetworkPolicy::None if !self.isolate_network => {
                return Err(SandboxError::Unsupported(
                    "network = none requires network isolation".to_string(),
                ))
            }
            NetworkPolicy::Allowlist(_) => {
                return Err(SandboxError::Unsupported(
                    "the process backend cannot enforce a host allowlist".to_string(),
                ))
            }
            _ => {}
        }

        let id = format!("redline-{}", Uuid::new_v4());
        let scratch = self.root.join(&id);
        tokio::fs::create_dir_all(&scratch)
            .await
            .map_err(|e| SandboxError::crash(format!("cannot create scratch directory: {e}")))?;

        Ok(EnvironmentHandle {
            id,
            scratch: Some(scratch),
        })
    }

    async fn run(
        &self,
        env: &EnvironmentHandle,
        spec: &ExecutionSpec,
        secrets: &ResolvedSecrets,
        limits: &ResourceLimits,
    ) -> Result<RawOutput, SandboxError> {
        let scratch = scratch_of(env)?;

        if !spec.files.is_empty() && limits.filesystem == FilesystemScope::ReadOnly {
            return Err(SandboxError::InvalidSpec(
                "cannot write files into a read-only environment".to_string(),
            ));
        }
        for (rel, bytes) in &spec.files {
            check_relative(rel)?;
            let target = scratch.join(rel);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SandboxError::crash(format!("cannot prepare {rel}: {e}")))?;
            }
            tokio::fs::write(&target, bytes)
                .await
                .map_err(|e| SandboxError::crash(format!("cannot write {rel}: {e}")))?;
        }

        let argv = self.argv(spec, limits);
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .env_clear()
            .env("PATH", &self.path_env)
            .env("HOME", scratch)
            .env("TMPDIR", scratch)
            .env("LANG", "C.UTF-8")
            .current_dir(scratch);
        for (key, value) in secrets.env_pairs() {
            cmd.env(key, value);
        }

        run_child(cmd, spec.stdin.as_deref(), limits).await
    }

    async fn destroy(&self, env: &EnvironmentHandle) -> Result<(), SandboxError> {
        let scratch = scratch_of(env)?;
        match tokio::fs::remove_dir_all(scratch).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SandboxError::crash(format!(
                "cannot remove scratch directory {}: {e}",
                scratch.display()
            ))),
        }
    }
}

// docker.rs — DockerBackend: one hardened container per environment.
//
// Drives the `docker` CLI:
//   create  → docker create … <image> sleep infinity ; docker start
//   run     → docker exec (files are streamed in first with `cat >`)
//   destroy → docker rm -f -v
//
// Containers get no network (unless the host network is requested), a
// memory cap with swap disabled, a CPU quota, a pids limit, a read-only root
// filesystem, no capabilities and no-new-privileges. Writable space, when
// the scope allows it, is a size-capped tmpfs at /scratch.
//
// Secret values are passed to `docker exec` through the CLI process's own
// environment (`-e NAME` without a value) so they never appear in argv.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use redline_credentials::ResolvedSecrets;

use crate::backend::{EnvironmentHandle, ExecutionBackend, RawOutput};
use crate::capture::run_child;
use crate::error::{LimitKind, SandboxError};
use crate::limits::{FilesystemScope, NetworkPolicy, ResourceLimits, CPU_PERIOD_US};
use crate::spec::{check_relative, ExecutionSpec};

/// Default image for shell and file actions.
pub const DEFAULT_IMAGE: &str = "ubuntu:22.04";

const SCRATCH_MOUNT: &str = "/scratch";

/// `docker run` exit code when the daemon itself failed.
const DOCKER_DAEMON_ERROR: i32 = 125;

/// 128 + SIGKILL: how an OOM-killed process exits.
const OOM_KILLED: i32 = 137;

pub struct DockerBackend {
    binary: String,
    image: String,
    pids_limit: u32,
    scratch_size: String,
}

impl DockerBackend {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            binary: "docker".to_string(),
            image: image.into(),
            pids_limit: 256,
            scratch_size: "64m".to_string(),
        }
    }

    /// Use a different CLI binary (e.g. `podman`).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Arguments for `docker create`.
    pub fn create_args(&self, name: &str, limits: &ResourceLimits) -> Result<Vec<String>, SandboxError> {
        let network = match &limits.network {
            NetworkPolicy::None => "none",
            NetworkPolicy::Host => "host",
            NetworkPolicy::Allowlist(_) => {
                return Err(SandboxError::Unsupported(
                    "the docker backend cannot enforce a host allowlist without an egress proxy"
                        .to_string(),
                ))
            }
        };
        let memory = format!("{}b", limits.memory_bytes);
        let cpu_period = CPU_PERIOD_US.to_string();
        let cpu_quota = limits.cpu_quota.to_string();
        let pids = self.pids_limit.to_string();

        let mut args: Vec<String> = [
            "create",
            "--name",
            name,
            "--network",
            network,
            "--memory",
            memory.as_str(),
            "--memory-swap",
            memory.as_str(),
            "--cpu-period",
            cpu_period.as_str(),
            "--cpu-quota",
            cpu_quota.as_str(),
            "--pids-limit",
            pids.as_str(),
            "--cap-drop",
            "ALL",
            "--security-opt",
            "no-new-privileges",
            "--read-only",
            "--label",
            "redline.sandbox=1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if limits.filesystem == FilesystemScope::Scratch {
            args.push("--tmpfs".to_string());
            args.push(format!(
                "{SCRATCH_MOUNT}:rw,nosuid,nodev,size={}",
                self.scratch_size
            ));
            args.push("--workdir".to_string());
            args.push(SCRATCH_MOUNT.to_string());
        }

        args.extend([self.image.clone(), "sleep".to_string(), "infinity".to_string()]);
        Ok(args)
    }

    /// Arguments for `docker exec`. Secret variables are named, not valued.
    pub fn exec_args(&self, id: &str, spec: &ExecutionSpec, secret_envs: &[&str]) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        if spec.stdin.is_some() {
            args.push("-i".to_string());
        }
        for env in secret_envs {
            args.push("-e".to_string());
            args.push(env.to_string());
        }
        args.push(id.to_string());
        args.push(spec.program.clone());
        args.extend(spec.args.iter().cloned());
        args
    }

    async fn docker(&self, args: &[String], stdin: Option<&[u8]>) -> Result<Vec<u8>, SandboxError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .map_err(|e| SandboxError::crash(format!("cannot run {}: {e}", self.binary)))?;
        if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(bytes)
                .await
                .map_err(|e| SandboxError::crash(format!("cannot stream into container: {e}")))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SandboxError::crash(format!("{} failed: {e}", self.binary)))?;
        if !output.status.success() {
            let verb = args.first().map(String::as_str).unwrap_or("");
            return Err(SandboxError::crash(format!(
                "{} {verb} failed: {}",
                self.binary,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }
}

impl Default for DockerBackend {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE)
    }
}

#[async_trait]
impl ExecutionBackend for DockerBackend {
    fn name(&self) -> &str {
        "docker"
    }

    async fn create(&self, limits: &ResourceLimits) -> Result<EnvironmentHandle, SandboxError> {
        let name = format!("redline-{}", Uuid::new_v4());
        let args = self.create_args(&name, limits)?;
        let out = self.docker(&args, None).await?;
        let id = String::from_utf8_lossy(&out).trim().to_string();
        let id = if id.is_empty() { name } else { id };

        let handle = EnvironmentHandle { id, scratch: None };
        if let Err(e) = self.docker(&["start".to_string(), handle.id.clone()], None).await {
            let _ = self.destroy(&handle).await;
            return Err(e);
        }
        Ok(handle)
    }

    async fn run(
        &self,
        env: &EnvironmentHandle,
        spec: &ExecutionSpec,
        secrets: &ResolvedSecrets,
        limits: &ResourceLimits,
    ) -> Result<RawOutput, SandboxError> {
        if !spec.files.is_empty() && limits.filesystem == FilesystemScope::ReadOnly {
            return Err(SandboxError::InvalidSpec(
                "cannot write files into a read-only environment".to_string(),
            ));
        }
        for (rel, bytes) in &spec.files {
            check_relative(rel)?;
            let args: Vec<String> = [
                "exec",
                "-i",
                env.id.as_str(),
                "sh",
                "-c",
                "mkdir -p \"$(dirname \"$1\")\" && cat > \"$1\"",
                "sh",
                rel.as_str(),
            ]
            .iter()
            .map(|s| s.to_string())
            .collect();
            self.docker(&args, Some(bytes)).await?;
        }

        let secret_envs: Vec<&str> = secrets.iter().map(|s| s.env()).collect();
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.exec_args(&env.id, spec, &secret_envs));
        for (key, value) in secrets.env_pairs() {
            cmd.env(key, value);
        }

        let out = run_child(cmd, spec.stdin.as_deref(), limits).await?;
        match out.exit_code {
            Some(DOCKER_DAEMON_ERROR) => Err(SandboxError::crash(format!(
                "docker exec failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ))),
            Some(OOM_KILLED) => Err(SandboxError::ResourceLimitExceeded {
                limit: LimitKind::Memory,
                detail: format!("killed at {} bytes", limits.memory_bytes),
            }),
            _ => Ok(out),
        }
    }

    async fn destroy(&self, env: &EnvironmentHandle) -> Result<(), SandboxError> {
        let args = ["rm", "-f", "-v", env.id.as_str()].map(String::from);
        self.docker(&args, None).await.map(|_| ())
    }
}

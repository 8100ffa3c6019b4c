// config.rs — Gateway configuration.
//
// GatewayConfig determines where the gateway keeps its state and how each
// stage is tuned. `for_project()` produces the standard `.redline/` layout
// with defaults; `load()` overlays `.redline/redline.toml` when present:
//
//   .redline/redline.toml           tuning (this file)
//   .redline/rules.yaml             active rule set (built-in set if absent)
//   .redline/audit.jsonl            hash-chained audit log
//   .redline/quarantine/{blobs,records}
//   .redline/pending/<handle>.json  actions awaiting an operator
//   .redline/sandbox/               process-backend scratch directories

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use redline_credentials::{SecretGrant, DEFAULT_ENV_PREFIX};
use redline_policy::{EngineConfig, Verdict};
use redline_quarantine::DEFAULT_RETENTION_DAYS;
use redline_sandbox::docker::DEFAULT_IMAGE;
use redline_sandbox::{ExecutorConfig, ResourceLimits};

use crate::error::MediationError;

/// Directory under the project root holding all gateway state.
pub const STATE_DIR: &str = ".redline";

/// Policy stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub default_verdict: Verdict,
    pub max_payload_bytes: usize,
    pub evaluation_timeout_ms: u64,
}

impl Default for PolicySection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            default_verdict: engine.default_verdict,
            max_payload_bytes: engine.max_payload_bytes,
            evaluation_timeout_ms: 1_000,
        }
    }
}

impl PolicySection {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            default_verdict: self.default_verdict,
            max_payload_bytes: self.max_payload_bytes,
        }
    }
}

/// Which execution backend runs approved actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Process,
    Docker,
}

/// Sandbox stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    pub backend: BackendKind,
    pub pool_size: usize,
    pub admission_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Docker image (e.g. `python:3.11-slim` for Python skills).
    pub image: String,
    /// Container CLI; any docker-compatible binary such as `podman`.
    pub docker_binary: String,
    /// PATH given to children of the process backend.
    pub process_path: Option<String>,
    /// Whether the process backend isolates the network with `unshare`.
    pub isolate_network: bool,
    pub limits: ResourceLimits,
}

impl Default for SandboxSection {
    fn default() -> Self {
        let executor = ExecutorConfig::default();
        Self {
            backend: BackendKind::Process,
            pool_size: executor.pool_size,
            admission_timeout_ms: executor.admission_timeout.as_millis() as u64,
            max_retries: executor.max_retries,
            retry_backoff_ms: executor.retry_backoff.as_millis() as u64,
            image: DEFAULT_IMAGE.to_string(),
            docker_binary: "docker".to_string(),
            process_path: None,
            isolate_network: true,
            limits: ResourceLimits::default(),
        }
    }
}

impl SandboxSection {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            pool_size: self.pool_size,
            admission_timeout: Duration::from_millis(self.admission_timeout_ms),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            ..ExecutorConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarantineSection {
    pub retention_days: i64,
    pub reclaim_interval_secs: u64,
}

impl Default for QuarantineSection {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            reclaim_interval_secs: 3_600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsSection {
    pub resolve_timeout_ms: u64,
    /// Environment prefix for the env credential backend.
    pub env_prefix: String,
    /// Grants. Empty means no action may resolve any secret.
    pub grants: Vec<SecretGrant>,
}

impl Default for SecretsSection {
    fn default() -> Self {
        Self {
            resolve_timeout_ms: 2_000,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            grants: Vec::new(),
        }
    }
}

/// Optional extra redactions on execution output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerSection {
    pub redact_emails: bool,
    pub redact_ips: bool,
}

/// The tunable part of the configuration, as it appears in `redline.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub policy: PolicySection,
    pub sandbox: SandboxSection,
    pub quarantine: QuarantineSection,
    pub secrets: SecretsSection,
    pub sanitizer: SanitizerSection,
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Self, MediationError> {
        toml::from_str(text).map_err(|e| MediationError::Config(e.to_string()))
    }
}

/// Full gateway configuration: state layout plus settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Root directory of the project.
    pub workspace_root: PathBuf,

    /// Path to the hash-chained audit log.
    pub audit_log: PathBuf,

    /// Quarantine store root (`blobs/` and `records/` beneath it).
    pub quarantine_dir: PathBuf,

    /// One JSON file per pending action.
    pub pending_dir: PathBuf,

    /// YAML rule set. The built-in set is used when the file is absent.
    pub rules_file: PathBuf,

    /// Scratch root for the process backend.
    pub sandbox_dir: PathBuf,

    #[serde(default)]
    pub settings: Settings,
}

impl GatewayConfig {
    /// Create a config with the standard `.redline/` layout for a project.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref().to_path_buf();
        let state = root.join(STATE_DIR);
        Self {
            workspace_root: root,
            audit_log: state.join("audit.jsonl"),
            quarantine_dir: state.join("quarantine"),
            pending_dir: state.join("pending"),
            rules_file: state.join("rules.yaml"),
            sandbox_dir: state.join("sandbox"),
            settings: Settings::default(),
        }
    }

    /// `for_project` plus `.redline/redline.toml`, if it exists.
    pub fn load(project_root: impl AsRef<Path>) -> Result<Self, MediationError> {
        let mut config = Self::for_project(project_root);
        let path = config.settings_file();
        if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| MediationError::Config(format!("cannot read {}: {e}", path.display())))?;
            config.settings = Settings::from_toml(&text)?;
            tracing::debug!(path = %path.display(), "loaded gateway settings");
        }
        Ok(config)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.workspace_root.join(STATE_DIR).join("redline.toml")
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.settings.quarantine.retention_days)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.settings.quarantine.reclaim_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redline_sandbox::NetworkPolicy;
    use tempfile::tempdir;

    #[test]
    fn for_project_uses_redline_layout() {
        let config = GatewayConfig::for_project("/work/app");
        assert_eq!(config.audit_log, PathBuf::from("/work/app/.redline/audit.jsonl"));
        assert_eq!(config.pending_dir, PathBuf::from("/work/app/.redline/pending"));
        assert_eq!(config.rules_file, PathBuf::from("/work/app/.redline/rules.yaml"));
    }

    #[test]
    fn defaults_fail_closed_and_match_sandbox_limits() {
        let settings = Settings::default();
        assert_eq!(settings.policy.default_verdict, Verdict::Deny);
        assert_eq!(settings.policy.max_payload_bytes, 1024 * 1024);
        assert_eq!(settings.sandbox.pool_size, 4);
        assert_eq!(settings.sandbox.admission_timeout_ms, 5_000);
        assert_eq!(settings.sandbox.limits.memory_bytes, 512 * 1024 * 1024);
        assert_eq!(settings.sandbox.limits.cpu_quota, 50_000);
        assert_eq!(settings.sandbox.limits.network, NetworkPolicy::None);
        assert_eq!(settings.quarantine.retention_days, 30);
        assert_eq!(settings.secrets.env_prefix, "REDLINE_SECRET_");
    }

    #[test]
    fn load_overlays_partial_toml() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".redline")).unwrap();
        std::fs::write(
            dir.path().join(".redline/redline.toml"),
            r#"
[sandbox]
backend = "docker"
docker_binary = "podman"
pool_size = 8

[sandbox.limits]
timeout_ms = 5000

[[secrets.grants]]
secret = "github/*"
kinds = ["network-call"]

[sanitizer]
redact_emails = true
"#,
        )
        .unwrap();

        let config = GatewayConfig::load(dir.path()).unwrap();
        let s = &config.settings;
        assert_eq!(s.sandbox.backend, BackendKind::Docker);
        assert_eq!(s.sandbox.pool_size, 8);
        assert_eq!(s.sandbox.docker_binary, "podman");
        assert_eq!(s.sandbox.process_path, None);
        assert_eq!(s.sandbox.limits.timeout, Duration::from_secs(5));
        assert_eq!(s.sandbox.limits.memory_bytes, 512 * 1024 * 1024);
        assert_eq!(s.sandbox.max_retries, 2);
        assert_eq!(s.secrets.grants.len(), 1);
        assert_eq!(s.secrets.grants[0].sessions, "*");
        assert!(s.sanitizer.redact_emails);
        assert!(!s.sanitizer.redact_ips);
        assert_eq!(s.policy.default_verdict, Verdict::Deny);
    }

    #[test]
    fn load_without_file_is_default() {
        let dir = tempdir().unwrap();
        let config = GatewayConfig::load(dir.path()).unwrap();
        assert_eq!(config.settings, Settings::default());
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        assert!(matches!(
            Settings::from_toml("[sandbox]\npool_size = \"many\""),
            Err(MediationError::Config(_))
        ));
    }
}

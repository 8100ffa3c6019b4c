//! Resource limits and bounded output capture.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Appended to a stream whose capture limit was reached.
pub const TRUNCATION_MARKER: &[u8] = b"\n... [output truncated by redline] ...\n";

/// What the environment may reach over the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "mode", content = "hosts")]
pub enum NetworkPolicy {
    /// No network at all.
    #[default]
    None,
    /// Outbound to the listed hosts only. Enforced by the backend.
    Allowlist(Vec<String>),
    /// The host's network. Only for trusted, local development.
    Host,
}

/// What the environment may see of a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilesystemScope {
    /// A private, writable scratch directory, discarded on teardown.
    #[default]
    Scratch,
    /// A read-only root with no writable location.
    ReadOnly,
}

/// Limits for one execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Wall-clock timeout.
    #[serde(with = "duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,
    /// Maximum memory in bytes.
    pub memory_bytes: u64,
    /// CPU quota in microseconds per 100 ms period (50_000 = half a core).
    pub cpu_quota: u64,
    /// Maximum captured bytes per stream (stdout, stderr).
    pub max_output_bytes: usize,
    pub network: NetworkPolicy,
    pub filesystem: FilesystemScope,
}

/// CPU scheduling period the quota is measured against, in microseconds.
pub const CPU_PERIOD_US: u64 = 100_000;

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            memory_bytes: 512 * 1024 * 1024,
            cpu_quota: 50_000,
            max_output_bytes: 1024 * 1024,
            network: NetworkPolicy::None,
            filesystem: FilesystemScope::Scratch,
        }
    }
}

impl ResourceLimits {
    /// CPU-seconds budget for a `ulimit -t` style cap: the quota share of
    /// the wall-clock timeout, at least one second.
    pub fn cpu_seconds(&self) -> u64 {
        let share = self.timeout.as_secs_f64() * self.cpu_quota as f64 / CPU_PERIOD_US as f64;
        (share.ceil() as u64).max(1)
    }
}

/// Serialize a Duration as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Buffer that keeps at most `limit` bytes and marks truncation.
#[derive(Debug, Clone)]
pub struct LimitedBuffer {
    buffer: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl LimitedBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Append `data`, keeping what fits. The marker is added once, at the
    /// point where data was first dropped.
    pub fn write(&mut self, data: &[u8]) {
        if self.truncated {
            return;
        }
        let remaining = self.limit.saturating_sub(self.buffer.len());
        let take = data.len().min(remaining);
        self.buffer.extend_from_slice(&data[..take]);
        if take < data.len() {
            self.truncated = true;
            self.buffer.extend_from_slice(TRUNCATION_MARKER);
        }
    }

    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

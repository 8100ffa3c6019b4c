// action.rs — The Action data model.
//
// An Action is one proposed unit of work from an agent: run a shell command,
// write a file, call the network, invoke a skill. Actions are immutable once
// built: fields are private and only readable through accessors, so nothing
// downstream of the policy decision can alter what was judged.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The category of an action.
///
/// Serialized as a kebab-case string (`"shell-exec"`). Unknown kinds are kept
/// verbatim in `Other` so rule authors can target connector-specific kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    ShellExec,
    FileWrite,
    NetworkCall,
    SkillInvoke,
    Other(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::ShellExec => "shell-exec",
            ActionKind::FileWrite => "file-write",
            ActionKind::NetworkCall => "network-call",
            ActionKind::SkillInvoke => "skill-invoke",
            ActionKind::Other(s) => s,
        }
    }

    /// True when the kind string is empty (never valid).
    pub fn is_empty(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl From<String> for ActionKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "shell-exec" => ActionKind::ShellExec,
            "file-write" => ActionKind::FileWrite,
            "network-call" => ActionKind::NetworkCall,
            "skill-invoke" => ActionKind::SkillInvoke,
            _ => ActionKind::Other(s),
        }
    }
}

impl From<&str> for ActionKind {
    fn from(s: &str) -> Self {
        ActionKind::from(s.to_string())
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to a credential an action needs at execution time.
///
/// Only the reference travels with the action (and into audit records).
/// The value is resolved just-in-time by the secret broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    /// Secret name in the credential backend (e.g., "github/deploy-token").
    pub name: String,
    /// Optional pinned version; `None` means latest.
    #[serde(default)]
    pub version: Option<String>,
    /// Environment variable the value is bound to inside the sandbox.
    pub env: String,
}

impl SecretRef {
    pub fn new(name: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            env: env.into(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.name, v),
            None => f.write_str(&self.name),
        }
    }
}

/// A proposed unit of work submitted by an agent session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    id: Uuid,
    kind: ActionKind,
    payload: serde_json::Value,
    requested_by: String,
    created_at: DateTime<Utc>,
    /// Free-form labels supplied by the orchestrator (e.g., `skill_signature`).
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    secret_refs: Vec<SecretRef>,
}

impl Action {
    /// Create a new action with a fresh id and the current timestamp.
    pub fn new(
        kind: impl Into<ActionKind>,
        payload: serde_json::Value,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload,
            requested_by: requested_by.into(),
            created_at: Utc::now(),
            tags: BTreeMap::new(),
            secret_refs: Vec::new(),
        }
    }

    /// Builder: attach a tag. Only usable while constructing the action.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Builder: attach a secret reference.
    pub fn with_secret(mut self, secret: SecretRef) -> Self {
        self.secret_refs.push(secret);
        self
    }

    /// Builder: pin the id (used when an orchestrator pre-assigns ids).
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Builder: pin the creation time (deterministic tests, replay).
    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn requested_by(&self) -> &str {
        &self.requested_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn secret_refs(&self) -> &[SecretRef] {
        &self.secret_refs
    }

    /// Canonical byte form of the payload.
    ///
    /// A bare JSON string yields its UTF-8 bytes; anything else is compact
    /// JSON. serde_json orders object keys, so the encoding is stable and
    /// safe to content-address.
    pub fn payload_bytes(&self) -> Vec<u8> {
        match &self.payload {
            serde_json::Value::String(s) => s.as_bytes().to_vec(),
            other => serde_json::to_vec(other).unwrap_or_default(),
        }
    }

    /// Payload rendered as text for pattern matching.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload_bytes()).into_owned()
    }

    /// Look up a payload field by JSON pointer (e.g., `/path`), as text.
    ///
    /// A bare string payload answers the pointer `""` and the well-known
    /// primary field of its kind (`/command` for shell-exec).
    pub fn field(&self, pointer: &str) -> Option<String> {
        if let serde_json::Value::String(s) = &self.payload {
            let primary = match self.kind {
                ActionKind::ShellExec => "/command",
                ActionKind::FileWrite => "/path",
                ActionKind::NetworkCall => "/url",
                ActionKind::SkillInvoke => "/skill",
                ActionKind::Other(_) => "",
            };
            return (pointer.is_empty() || pointer == primary).then(|| s.clone());
        }
        self.payload.pointer(pointer).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

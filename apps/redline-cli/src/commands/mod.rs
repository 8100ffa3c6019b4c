// mod.rs — Subcommand modules and the shared action-file format.

pub mod audit;
pub mod pending;
pub mod policy;
pub mod quarantine;
pub mod submit;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use redline_policy::{Action, ActionKind, SecretRef};
use serde::Deserialize;
use uuid::Uuid;

/// An action as an operator writes it by hand. The id and timestamp are
/// assigned on load unless given, which lets an operator replay an action
/// from the audit trail under its original identity.
///
/// ```json
/// {
///   "kind": "shell-exec",
///   "payload": "ls -la",
///   "requested_by": "session-1",
///   "tags": { "allowlisted_host": "api.example.com" },
///   "secrets": [{ "name": "api/token", "env": "API_TOKEN" }]
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct ActionFile {
    pub kind: ActionKind,
    pub payload: serde_json::Value,
    #[serde(default = "operator_session")]
    pub requested_by: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub secrets: Vec<SecretRef>,
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn operator_session() -> String {
    "operator".to_string()
}

impl ActionFile {
    pub fn into_action(self) -> Action {
        let mut action = Action::new(self.kind, self.payload, self.requested_by);
        for (key, value) in self.tags {
            action = action.with_tag(key, value);
        }
        for secret in self.secrets {
            action = action.with_secret(secret);
        }
        if let Some(id) = self.id {
            action = action.with_id(id);
        }
        if let Some(at) = self.created_at {
            action = action.with_created_at(at);
        }
        action
    }
}

pub fn read_action(path: &Path) -> anyhow::Result<Action> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read action file {}", path.display()))?;
    let file: ActionFile = serde_json::from_str(&text)
        .with_context(|| format!("invalid action file {}", path.display()))?;
    Ok(file.into_action())
}

/// Parse `key=value` for `--attr`.
pub fn parse_attribute(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{s}'"))
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

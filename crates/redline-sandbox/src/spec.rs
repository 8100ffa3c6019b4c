// spec.rs — Turning an Action into something a backend can run.
//
//   shell-exec    "cmd" or {"command": "cmd"}           → sh -c cmd
//   file-write    {"path", "content"}                   → materialize file, report size
//   network-call  {"url", "method"?, "headers"?, "body"?} → curl
//   skill-invoke  {"skill", "entry"?, "args"?}           → entry point with args
//   other         {"program", "args"?}                  → program with args
//
// Specs never contain secret values; those are injected by the backend as
// environment variables at run time.

use std::path::{Component, Path};

use serde_json::Value;

use redline_policy::{Action, ActionKind};

use crate::error::SandboxError;

/// A concrete process invocation inside an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Files to materialize in the environment's scratch area before running.
    /// Paths are relative and never escape the scratch root.
    pub files: Vec<(String, Vec<u8>)>,
    /// Bytes written to the process's stdin.
    pub stdin: Option<Vec<u8>>,
}

impl ExecutionSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            files: Vec::new(),
            stdin: None,
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Self::new("sh", vec!["-c".to_string(), command.into()])
    }

    pub fn from_action(action: &Action) -> Result<Self, SandboxError> {
        let payload = action.payload();
        match action.kind() {
            ActionKind::ShellExec => {
                let command = text_field(payload, "command")
                    .ok_or_else(|| invalid("shell-exec needs a command string"))?;
                Ok(Self::shell(command))
            }
            ActionKind::FileWrite => {
                let path = string_field(payload, "path")
                    .ok_or_else(|| invalid("file-write needs a path"))?;
                check_relative(&path)?;
                let content = string_field(payload, "content").unwrap_or_default();
                let mut spec = Self::new(
                    "sh",
                    vec![
                        "-c".to_string(),
                        "wc -c < \"$1\"".to_string(),
                        "sh".to_string(),
                        path.clone(),
                    ],
                );
                spec.files.push((path, content.into_bytes()));
                Ok(spec)
            }
            ActionKind::NetworkCall => {
                let url = string_field(payload, "url")
                    .ok_or_else(|| invalid("network-call needs a url"))?;
                if !(url.starts_with("https://") || url.starts_with("http://")) {
                    return Err(invalid("network-call url must be http(s)"));
                }
                let method = string_field(payload, "method")
                    .unwrap_or_else(|| "GET".to_string())
                    .to_ascii_uppercase();
                let mut args = vec![
                    "-sS".to_string(),
                    "--proto".to_string(),
                    "=http,https".to_string(),
                    "-X".to_string(),
                    method,
                ];
                if let Some(Value::Object(headers)) = payload.get("headers") {
                    for (name, value) in headers {
                        let value = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                        args.push("-H".to_string());
                        args.push(format!("{name}: {value}"));
                    }
                }
                let mut spec = Self::new("curl", args);
                if let Some(body) = payload.get("body") {
                    let bytes = match body {
                        Value::String(s) => s.clone().into_bytes(),
                        other => other.to_string().into_bytes(),
                    };
                    spec.args.push("--data-binary".to_string());
                    spec.args.push("@-".to_string());
                    spec.stdin = Some(bytes);
                }
                spec.args.push("--".to_string());
                spec.args.push(url);
                Ok(spec)
            }
            ActionKind::SkillInvoke => {
                let skill = string_field(payload, "skill")
                    .ok_or_else(|| invalid("skill-invoke needs a skill name"))?;
                let program = string_field(payload, "entry").unwrap_or(skill);
                Ok(Self::new(program, string_list(payload, "args")?))
            }
            ActionKind::Other(kind) => {
                let program = string_field(payload, "program")
                    .ok_or_else(|| invalid(&format!("no execution mapping for kind '{kind}'")))?;
                Ok(Self::new(program, string_list(payload, "args")?))
            }
        }
    }
}

fn invalid(msg: &str) -> SandboxError {
    SandboxError::InvalidSpec(msg.to_string())
}

/// A bare string payload, or `payload[key]` as a string.
fn text_field(payload: &Value, key: &str) -> Option<String> {
    match payload {
        Value::String(s) => Some(s.clone()),
        other => string_field(other, key),
    }
}

fn string_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn string_list(payload: &Value, key: &str) -> Result<Vec<String>, SandboxError> {
    match payload.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                Value::Number(_) | Value::Bool(_) => Ok(v.to_string()),
                _ => Err(invalid(&format!("'{key}' must hold strings"))),
            })
            .collect(),
        Some(_) => Err(invalid(&format!("'{key}' must be an array"))),
    }
}

pub(crate) fn check_relative(path: &str) -> Result<(), SandboxError> {
    let p = Path::new(path);
    let escapes = path.is_empty()
        || p.components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(invalid(&format!("path '{path}' must stay inside the scratch area")));
    }
    Ok(())
}

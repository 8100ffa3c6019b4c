// rule.rs — Rule definitions and the predicate language.
//
// Rule *content* is externally authored configuration (YAML). Predicates are
// a closed, tagged-variant AST: there is no scripting hook, no filesystem or
// network access, and no clock read. That keeps evaluation pure and makes
// every rule reviewable by reading it.
//
// Patterns (regex, glob) are compiled once when a rule set is loaded; an
// invalid pattern rejects the rule set then, never during evaluation.

use std::collections::BTreeMap;
use std::fmt;

use glob::Pattern;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionKind};
use crate::error::PolicyError;

/// What happens when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleEffect {
    Allow,
    Deny,
    Quarantine,
    RequireApproval,
}

impl RuleEffect {
    /// Tie-break rank among rules of equal priority (lower sorts first).
    ///
    /// Deny → quarantine → require_approval → allow: at equal priority the
    /// more restrictive rule is evaluated first.
    pub fn rank(&self) -> u8 {
        match self {
            RuleEffect::Deny => 0,
            RuleEffect::Quarantine => 1,
            RuleEffect::RequireApproval => 2,
            RuleEffect::Allow => 3,
        }
    }

    /// Deny and quarantine end evaluation on first match.
    pub fn short_circuits(&self) -> bool {
        matches!(self, RuleEffect::Deny | RuleEffect::Quarantine)
    }
}

impl fmt::Display for RuleEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleEffect::Allow => "allow",
            RuleEffect::Deny => "deny",
            RuleEffect::Quarantine => "quarantine",
            RuleEffect::RequireApproval => "require_approval",
        };
        f.write_str(s)
    }
}

/// How serious a rule violation is. Recorded, never used for ordering.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    #[default]
    Medium,
    High,
    /// A redline: an absolute, non-negotiable restriction.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A boolean predicate over an action and its evaluation context.
///
/// Serialized with an `op` tag, e.g.:
///
/// ```yaml
/// when:
///   op: all
///   of:
///     - { op: kind, kind: shell-exec }
///     - { op: payload_regex, pattern: 'rm\s+-rf\s+/' }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Matches every action.
    Always,
    /// The action kind equals `kind`.
    Kind { kind: ActionKind },
    /// The requesting session matches a glob (e.g., `ci-*`).
    Session { pattern: String },
    /// The tag `key` is present (and equals `value` when given).
    Tag {
        key: String,
        #[serde(default)]
        value: Option<String>,
    },
    /// The tag `key` is present with one of `values`.
    TagIn { key: String, values: Vec<String> },
    /// An evaluation-context attribute equals `value`.
    Context { key: String, value: String },
    /// The payload text contains `needle` (case-insensitive by default).
    PayloadContains {
        needle: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    /// The payload text contains any of `needles` (case-insensitive by default).
    PayloadContainsAny {
        needles: Vec<String>,
        #[serde(default)]
        case_sensitive: bool,
    },
    /// The payload text matches a regex.
    PayloadRegex { pattern: String },
    /// A payload field (JSON pointer) equals `value`.
    FieldEquals { field: String, value: String },
    /// A payload field (JSON pointer) matches a regex.
    FieldRegex { field: String, pattern: String },
    /// A payload field (JSON pointer) matches a glob.
    FieldGlob { field: String, pattern: String },
    /// The canonical payload is larger than `bytes`.
    PayloadLargerThan { bytes: usize },
    All { of: Vec<Predicate> },
    Any { of: Vec<Predicate> },
    Not { predicate: Box<Predicate> },
}

/// A named, versioned policy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default = "default_rule_version")]
    pub version: u32,
    #[serde(default)]
    pub description: String,
    /// Higher priority is evaluated first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub severity: Severity,
    pub effect: RuleEffect,
    pub when: Predicate,
}

fn default_rule_version() -> u32 {
    1
}

impl Rule {
    /// Convenience constructor used by the built-in rule set and tests.
    pub fn new(
        name: impl Into<String>,
        priority: i32,
        severity: Severity,
        effect: RuleEffect,
        when: Predicate,
    ) -> Self {
        Self {
            name: name.into(),
            version: 1,
            description: String::new(),
            priority,
            severity,
            effect,
            when,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ── Compiled form ────────────────────────────────────────────────

/// Inputs a predicate is evaluated against. Built once per evaluation so the
/// payload is rendered to text only once.
pub(crate) struct EvalInput<'a> {
    pub action: &'a Action,
    pub attributes: &'a BTreeMap<String, String>,
    pub text: String,
    pub text_lower: String,
    pub size: usize,
}

impl<'a> EvalInput<'a> {
    pub fn new(action: &'a Action, attributes: &'a BTreeMap<String, String>) -> Self {
        let bytes = action.payload_bytes();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let text_lower = text.to_lowercase();
        Self {
            action,
            attributes,
            size: bytes.len(),
            text,
            text_lower,
        }
    }
}

/// A predicate with all patterns pre-compiled.
#[derive(Debug, Clone)]
pub(crate) enum CompiledPredicate {
    Always,
    Kind(ActionKind),
    Session(Pattern),
    Tag(String, Option<String>),
    TagIn(String, Vec<String>),
    Context(String, String),
    Contains(Vec<String>, bool),
    PayloadRegex(Regex),
    FieldEquals(String, String),
    FieldRegex(String, Regex),
    FieldGlob(String, Pattern),
    LargerThan(usize),
    All(Vec<CompiledPredicate>),
    Any(Vec<CompiledPredicate>),
    Not(Box<CompiledPredicate>),
}

impl CompiledPredicate {
    pub fn compile(rule: &str, predicate: &Predicate) -> Result<Self, PolicyError> {
        let compiled = match predicate {
            Predicate::Always => CompiledPredicate::Always,
            Predicate::Kind { kind } => CompiledPredicate::Kind(kind.clone()),
            Predicate::Session { pattern } => {
                CompiledPredicate::Session(compile_glob(rule, pattern)?)
            }
            Predicate::Tag { key, value } => CompiledPredicate::Tag(key.clone(), value.clone()),
            Predicate::TagIn { key, values } => {
                CompiledPredicate::TagIn(key.clone(), values.clone())
            }
            Predicate::Context { key, value } => {
                CompiledPredicate::Context(key.clone(), value.clone())
            }
            Predicate::PayloadContains {
                needle,
                case_sensitive,
            } => CompiledPredicate::Contains(
                vec![fold(needle, *case_sensitive)],
                *case_sensitive,
            ),
            Predicate::PayloadContainsAny {
                needles,
                case_sensitive,
            } => CompiledPredicate::Contains(
                needles.iter().map(|n| fold(n, *case_sensitive)).collect(),
                *case_sensitive,
            ),
            Predicate::PayloadRegex { pattern } => {
                CompiledPredicate::PayloadRegex(compile_regex(rule, pattern)?)
            }
            Predicate::FieldEquals { field, value } => {
                CompiledPredicate::FieldEquals(field.clone(), value.clone())
            }
            Predicate::FieldRegex { field, pattern } => {
                CompiledPredicate::FieldRegex(field.clone(), compile_regex(rule, pattern)?)
            }
            Predicate::FieldGlob { field, pattern } => {
                CompiledPredicate::FieldGlob(field.clone(), compile_glob(rule, pattern)?)
            }
            Predicate::PayloadLargerThan { bytes } => CompiledPredicate::LargerThan(*bytes),
            Predicate::All { of } => CompiledPredicate::All(
                of.iter()
                    .map(|p| Self::compile(rule, p))
                    .collect::<Result<_, _>>()?,
            ),
            Predicate::Any { of } => CompiledPredicate::Any(
                of.iter()
                    .map(|p| Self::compile(rule, p))
                    .collect::<Result<_, _>>()?,
            ),
            Predicate::Not { predicate } => {
                CompiledPredicate::Not(Box::new(Self::compile(rule, predicate)?))
            }
        };
        Ok(compiled)
    }

    pub fn matches(&self, input: &EvalInput<'_>) -> bool {
        match self {
            CompiledPredicate::Always => true,
            CompiledPredicate::Kind(kind) => input.action.kind() == kind,
            CompiledPredicate::Session(p) => p.matches(input.action.requested_by()),
            CompiledPredicate::Tag(key, value) => match (input.action.tag(key), value) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            },
            CompiledPredicate::TagIn(key, values) => input
                .action
                .tag(key)
                .is_some_and(|actual| values.iter().any(|v| v == actual)),
            CompiledPredicate::Context(key, value) => {
                input.attributes.get(key).is_some_and(|v| v == value)
            }
            CompiledPredicate::Contains(needles, case_sensitive) => {
                let haystack = if *case_sensitive {
                    &input.text
                } else {
                    &input.text_lower
                };
                needles.iter().any(|n| haystack.contains(n.as_str()))
            }
            CompiledPredicate::PayloadRegex(re) => re.is_match(&input.text),
            CompiledPredicate::FieldEquals(field, value) => {
                input.action.field(field).is_some_and(|v| &v == value)
            }
            CompiledPredicate::FieldRegex(field, re) => {
                input.action.field(field).is_some_and(|v| re.is_match(&v))
            }
            CompiledPredicate::FieldGlob(field, p) => {
                input.action.field(field).is_some_and(|v| p.matches(&v))
            }
            CompiledPredicate::LargerThan(bytes) => input.size > *bytes,
            CompiledPredicate::All(of) => of.iter().all(|p| p.matches(input)),
            CompiledPredicate::Any(of) => of.iter().any(|p| p.matches(input)),
            CompiledPredicate::Not(p) => !p.matches(input),
        }
    }
}

fn fold(s: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        s.to_string()
    } else {
        s.to_lowercase()
    }
}

fn compile_regex(rule: &str, pattern: &str) -> Result<Regex, PolicyError> {
    RegexBuilder::new(pattern)
        .size_limit(1 << 20)
        .build()
        .map_err(|e| PolicyError::InvalidPattern {
            rule: rule.to_string(),
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

fn compile_glob(rule: &str, pattern: &str) -> Result<Pattern, PolicyError> {
    Pattern::new(pattern).map_err(|e| PolicyError::InvalidPattern {
        rule: rule.to_string(),
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

// decision.rs — Verdicts and Decisions.
//
// A Decision is the immutable output of policy evaluation for one Action.
// Operator resolutions of a PendingApproval are *new* Decisions that
// reference the same action; nothing is ever edited in place.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rule::{RuleEffect, Severity};

/// The categorical outcome of policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Deny,
    Quarantine,
    PendingApproval,
}

impl Verdict {
    /// Whether this verdict ends the action's lifecycle without further input.
    pub fn is_final(&self) -> bool {
        !matches!(self, Verdict::PendingApproval)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Allow => "allow",
            Verdict::Deny => "deny",
            Verdict::Quarantine => "quarantine",
            Verdict::PendingApproval => "pending_approval",
        };
        f.write_str(s)
    }
}

impl From<RuleEffect> for Verdict {
    fn from(effect: RuleEffect) -> Self {
        match effect {
            RuleEffect::Allow => Verdict::Allow,
            RuleEffect::Deny => Verdict::Deny,
            RuleEffect::Quarantine => Verdict::Quarantine,
            RuleEffect::RequireApproval => Verdict::PendingApproval,
        }
    }
}

/// A rule that matched during evaluation, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub name: String,
    pub version: u32,
    pub priority: i32,
    pub severity: Severity,
    pub effect: RuleEffect,
}

/// Who produced a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DecisionSource {
    /// The policy engine, against a specific rule-set version.
    Policy { ruleset_version: String },
    /// A human operator resolving a PendingApproval.
    Operator { operator: String },
}

/// The output of policy evaluation (or of an operator resolution).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action_id: Uuid,
    pub verdict: Verdict,
    /// Matched rules, in the order they were evaluated.
    pub matched_rules: Vec<MatchedRule>,
    pub reason: String,
    pub evaluated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub source: DecisionSource,
}

impl Decision {
    /// Build an operator resolution for a pending action.
    pub fn resolution(
        action_id: Uuid,
        verdict: Verdict,
        reason: impl Into<String>,
        operator: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            action_id,
            verdict,
            matched_rules: Vec::new(),
            reason: reason.into(),
            evaluated_at: at,
            source: DecisionSource::Operator {
                operator: operator.into(),
            },
        }
    }

    /// Names of matched rules, for logs and audit metadata.
    pub fn rule_names(&self) -> Vec<&str> {
        self.matched_rules.iter().map(|r| r.name.as_str()).collect()
    }
}

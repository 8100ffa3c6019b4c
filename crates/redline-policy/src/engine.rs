// engine.rs — Policy evaluation engine.
//
// Every proposed action passes through `evaluate()`:
//
// 1. Is the action well-formed (non-empty kind)? → No → MalformedAction error
// 2. Is the payload under the size ceiling? → No → PayloadTooLarge error
// 3. Walk rules in descending priority:
//    - first matching deny/quarantine → that verdict, stop
//    - remember require_approval and allow matches
// 4. Any require_approval matched? → PendingApproval
// 5. Any allow matched? → Allow
// 6. Nothing matched → configured default (Deny unless overridden)
//
// The engine reads no clock: `evaluated_at` comes from the context, so the
// same (action, context, rule-set version) always gives the same Decision.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::decision::{Decision, DecisionSource, MatchedRule, Verdict};
use crate::error::PolicyError;
use crate::rule::{EvalInput, RuleEffect};
use crate::ruleset::{CompiledRule, CompiledRuleSet, RuleCache, RuleSet, RuleStore};

/// Default payload ceiling: 1 MiB.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Verdict when no rule matches. Fail-closed by default.
    pub default_verdict: Verdict,
    /// Largest canonical payload the engine will judge.
    pub max_payload_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_verdict: Verdict::Deny,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

/// Per-evaluation context supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// Timestamp stamped onto the Decision.
    pub now: DateTime<Utc>,
    /// Deployment attributes rules can test (e.g., `environment = prod`).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl EvaluationContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            attributes: BTreeMap::new(),
        }
    }

    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// One rule inspected during evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationStep {
    pub rule: String,
    pub priority: i32,
    pub effect: RuleEffect,
    pub matched: bool,
    /// Whether this step decided the verdict.
    pub terminal: bool,
}

/// Decision plus the ordered record of how it was reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationTrace {
    pub decision: Decision,
    pub steps: Vec<EvaluationStep>,
}

/// The policy engine: a rule cache plus configuration.
pub struct PolicyEngine {
    config: EngineConfig,
    rules: RuleCache,
}

impl PolicyEngine {
    pub fn new(ruleset: &RuleSet, config: EngineConfig) -> Result<Self, PolicyError> {
        Ok(Self {
            config,
            rules: RuleCache::new(ruleset)?,
        })
    }

    /// Build an engine from whatever the rule store currently holds.
    pub fn from_store(store: &dyn RuleStore, config: EngineConfig) -> Result<Self, PolicyError> {
        let ruleset = store.load_active_ruleset()?;
        Self::new(&ruleset, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The active snapshot.
    pub fn snapshot(&self) -> Result<Arc<CompiledRuleSet>, PolicyError> {
        self.rules.snapshot()
    }

    /// Replace the active rule set atomically.
    pub fn swap_rules(&self, ruleset: &RuleSet) -> Result<Arc<CompiledRuleSet>, PolicyError> {
        self.rules.swap(ruleset)
    }

    /// Reload from a rule store atomically.
    pub fn reload(&self, store: &dyn RuleStore) -> Result<Arc<CompiledRuleSet>, PolicyError> {
        self.rules.reload(store)
    }

    /// Evaluate an action against the active snapshot.
    pub fn evaluate(
        &self,
        action: &Action,
        context: &EvaluationContext,
    ) -> Result<Decision, PolicyError> {
        let snapshot = self.rules.snapshot()?;
        self.evaluate_against(&snapshot, action, context)
    }

    /// Evaluate against an explicit snapshot (the caller pins the version).
    pub fn evaluate_against(
        &self,
        snapshot: &CompiledRuleSet,
        action: &Action,
        context: &EvaluationContext,
    ) -> Result<Decision, PolicyError> {
        self.run(snapshot, action, context, None)
    }

    /// Evaluate and record every rule inspected.
    pub fn evaluate_with_trace(
        &self,
        action: &Action,
        context: &EvaluationContext,
    ) -> Result<EvaluationTrace, PolicyError> {
        let snapshot = self.rules.snapshot()?;
        let mut steps = Vec::new();
        let decision = self.run(&snapshot, action, context, Some(&mut steps))?;
        Ok(EvaluationTrace { decision, steps })
    }

    fn validate(&self, action: &Action) -> Result<(), PolicyError> {
        if action.kind().is_empty() {
            return Err(PolicyError::MalformedAction(
                "action kind must not be empty".to_string(),
            ));
        }
        let size = action.payload_bytes().len();
        if size > self.config.max_payload_bytes {
            return Err(PolicyError::PayloadTooLarge {
                size,
                limit: self.config.max_payload_bytes,
            });
        }
        Ok(())
    }

    fn run(
        &self,
        snapshot: &CompiledRuleSet,
        action: &Action,
        context: &EvaluationContext,
        mut steps: Option<&mut Vec<EvaluationStep>>,
    ) -> Result<Decision, PolicyError> {
        self.validate(action)?;

        let input = EvalInput::new(action, &context.attributes);
        let mut matched: Vec<&CompiledRule> = Vec::new();
        let mut first_approval: Option<&CompiledRule> = None;
        let mut first_allow: Option<&CompiledRule> = None;
        let mut blocking: Option<&CompiledRule> = None;

        for compiled in &snapshot.rules {
            let hit = compiled.predicate.matches(&input);
            let terminal = hit && compiled.rule.effect.short_circuits();
            if let Some(steps) = steps.as_deref_mut() {
                steps.push(EvaluationStep {
                    rule: compiled.rule.name.clone(),
                    priority: compiled.rule.priority,
                    effect: compiled.rule.effect,
                    matched: hit,
                    terminal,
                });
            }
            if !hit {
                continue;
            }
            matched.push(compiled);
            match compiled.rule.effect {
                RuleEffect::Deny | RuleEffect::Quarantine => {
                    blocking = Some(compiled);
                    break;
                }
                RuleEffect::RequireApproval => {
                    first_approval.get_or_insert(compiled);
                }
                RuleEffect::Allow => {
                    first_allow.get_or_insert(compiled);
                }
            }
        }

        let (verdict, reason) = match (blocking, first_approval, first_allow) {
            (Some(rule), _, _) => (rule.rule.effect.into(), cite(rule, action)),
            (None, Some(rule), _) => (Verdict::PendingApproval, cite(rule, action)),
            (None, None, Some(rule)) => (Verdict::Allow, cite(rule, action)),
            (None, None, None) => (
                self.config.default_verdict,
                format!(
                    "no rule matched {} action; default verdict is {}",
                    action.kind(),
                    self.config.default_verdict
                ),
            ),
        };

        // The decisive non-blocking rule is marked terminal in the trace.
        if blocking.is_none() {
            let decisive = first_approval.or(first_allow).map(|r| r.rule.name.as_str());
            if let (Some(steps), Some(name)) = (steps.as_deref_mut(), decisive) {
                if let Some(step) = steps.iter_mut().find(|s| s.rule == name) {
                    step.terminal = true;
                }
            }
        }

        let decision = Decision {
            action_id: action.id(),
            verdict,
            matched_rules: matched
                .iter()
                .map(|c| MatchedRule {
                    name: c.rule.name.clone(),
                    version: c.rule.version,
                    priority: c.rule.priority,
                    severity: c.rule.severity,
                    effect: c.rule.effect,
                })
                .collect(),
            reason,
            evaluated_at: context.now,
            source: DecisionSource::Policy {
                ruleset_version: snapshot.version.clone(),
            },
        };

        tracing::debug!(
            action_id = %action.id(),
            kind = %action.kind(),
            verdict = %decision.verdict,
            matched = decision.matched_rules.len(),
            ruleset_version = %snapshot.version,
            "policy evaluated"
        );

        Ok(decision)
    }
}

fn cite(compiled: &CompiledRule, action: &Action) -> String {
    let rule = &compiled.rule;
    let mut reason = format!(
        "rule '{}' ({} severity) {} {} action",
        rule.name,
        rule.severity,
        verb(rule.effect),
        action.kind()
    );
    if !rule.description.is_empty() {
        reason.push_str(": ");
        reason.push_str(&rule.description);
    }
    reason
}

fn verb(effect: RuleEffect) -> &'static str {
    match effect {
        RuleEffect::Allow => "allows",
        RuleEffect::Deny => "denies",
        RuleEffect::Quarantine => "quarantines",
        RuleEffect::RequireApproval => "requires approval for",
    }
}

//! # redline-policy
//!
//! Rule sets and deterministic policy evaluation for Redline.
//!
//! Every action an agent proposes is described by an [`Action`] and judged by
//! the [`PolicyEngine`] against the active [`RuleSet`] snapshot. The result is
//! a [`Decision`] carrying a [`Verdict`], the ordered list of matched rules,
//! and a human-readable reason.
//!
//! ## Key invariants
//!
//! - **Fail closed**: no matching rule → the configured default verdict,
//!   which is Deny unless explicitly overridden.
//! - **Denial wins**: the first matching `deny` or `quarantine` rule (in
//!   priority order) short-circuits, no matter how many `allow` rules match.
//! - **Deterministic**: identical (action, context, rule-set version) always
//!   produce an identical Decision. Rule predicates are a closed AST with no
//!   host access.
//! - **Atomic reloads**: rule sets are swapped as whole snapshots; an
//!   in-flight evaluation never observes a half-updated rule set.

pub mod action;
pub mod builtin;
pub mod decision;
pub mod engine;
pub mod error;
pub mod rule;
pub mod ruleset;

pub use action::{Action, ActionKind, SecretRef};
pub use decision::{Decision, DecisionSource, MatchedRule, Verdict};
pub use engine::{
    EngineConfig, EvaluationContext, EvaluationStep, EvaluationTrace, PolicyEngine,
};
pub use error::PolicyError;
pub use rule::{Predicate, Rule, RuleEffect, Severity};
pub use ruleset::{
    CompiledRuleSet, FileRuleStore, RuleCache, RuleSet, RuleStore, StaticRuleStore,
};

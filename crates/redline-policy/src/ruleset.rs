// ruleset.rs — Versioned rule sets, rule stores, and the snapshot cache.
//
// The rule store is an external, read-only collaborator: the engine asks it
// for the active rule set and caches a compiled snapshot. Reloads compile
// the new set completely, then swap an `Arc` under a write lock, so any
// evaluation holding the old `Arc` finishes against the old set untouched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::rule::{CompiledPredicate, Rule};

/// A versioned collection of rules, as authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(version: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            version: version.into(),
            rules,
        }
    }

    /// An empty rule set. With the default configuration every action is denied.
    pub fn empty() -> Self {
        Self::new("empty", Vec::new())
    }

    /// Parse a rule set from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Compile all predicates and fix the evaluation order.
    pub fn compile(&self) -> Result<CompiledRuleSet, PolicyError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            if !seen.insert(rule.name.as_str()) {
                return Err(PolicyError::DuplicateRule(rule.name.clone()));
            }
            let predicate = CompiledPredicate::compile(&rule.name, &rule.when)?;
            rules.push(CompiledRule {
                rule: rule.clone(),
                predicate,
            });
        }

        // Descending priority; ties broken by effect (deny first), then name.
        rules.sort_by(|a, b| {
            b.rule
                .priority
                .cmp(&a.rule.priority)
                .then(a.rule.effect.rank().cmp(&b.rule.effect.rank()))
                .then(a.rule.name.cmp(&b.rule.name))
        });

        Ok(CompiledRuleSet {
            version: self.version.clone(),
            rules,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledRule {
    pub rule: Rule,
    pub predicate: CompiledPredicate,
}

/// An immutable, compiled snapshot of a rule set in evaluation order.
#[derive(Debug, Clone)]
pub struct CompiledRuleSet {
    pub(crate) version: String,
    pub(crate) rules: Vec<CompiledRule>,
}

impl CompiledRuleSet {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in the order the engine evaluates them.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|c| &c.rule)
    }
}

/// Source of the active rule set.
pub trait RuleStore: Send + Sync {
    fn load_active_ruleset(&self) -> Result<RuleSet, PolicyError>;
}

/// Rule store backed by a YAML file on disk.
pub struct FileRuleStore {
    path: PathBuf,
}

impl FileRuleStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RuleStore for FileRuleStore {
    fn load_active_ruleset(&self) -> Result<RuleSet, PolicyError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| PolicyError::LoadFailed {
            path: self.path.display().to_string(),
            source,
        })?;
        RuleSet::from_yaml(&text)
    }
}

/// Rule store holding a fixed in-memory rule set.
pub struct StaticRuleStore {
    ruleset: RuleSet,
}

impl StaticRuleStore {
    pub fn new(ruleset: RuleSet) -> Self {
        Self { ruleset }
    }
}

impl RuleStore for StaticRuleStore {
    fn load_active_ruleset(&self) -> Result<RuleSet, PolicyError> {
        Ok(self.ruleset.clone())
    }
}

/// Holds the active compiled snapshot and swaps it atomically.
pub struct RuleCache {
    current: RwLock<Arc<CompiledRuleSet>>,
}

impl RuleCache {
    pub fn new(ruleset: &RuleSet) -> Result<Self, PolicyError> {
        Ok(Self {
            current: RwLock::new(Arc::new(ruleset.compile()?)),
        })
    }

    /// The snapshot an evaluation should bind to for its whole lifetime.
    pub fn snapshot(&self) -> Result<Arc<CompiledRuleSet>, PolicyError> {
        self.current
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| PolicyError::LockPoisoned)
    }

    /// Compile `ruleset` and make it the active snapshot.
    ///
    /// If compilation fails the previous snapshot stays active.
    pub fn swap(&self, ruleset: &RuleSet) -> Result<Arc<CompiledRuleSet>, PolicyError> {
        let compiled = Arc::new(ruleset.compile()?);
        let mut guard = self.current.write().map_err(|_| PolicyError::LockPoisoned)?;
        *guard = Arc::clone(&compiled);
        Ok(compiled)
    }

    /// Reload from a rule store (the explicit reload signal).
    pub fn reload(&self, store: &dyn RuleStore) -> Result<Arc<CompiledRuleSet>, PolicyError> {
        let ruleset = store.load_active_ruleset()?;
        let compiled = self.swap(&ruleset)?;
        tracing::info!(
            ruleset_version = %compiled.version(),
            rules = compiled.len(),
            "rule set reloaded"
        );
        Ok(compiled)
    }
}

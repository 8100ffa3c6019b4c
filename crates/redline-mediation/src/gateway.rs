// gateway.rs — MediationGateway: the single entry point for agent actions.
//
// Every submission flows through policy → (sandbox | quarantine | pending)
// → audit, and the audit entry is durable before the caller hears back:
//
//   Allow            → resolve secrets → execute → sanitize → audit → Allowed
//   Deny             → audit → Denied
//   Quarantine       → store payload → audit → Quarantined
//   PendingApproval  → persist → audit → Pending
//
// A failure at any stage is audited too, then surfaced. If the audit write
// itself fails, the request fails with AuditWriteFailed whatever happened
// before it.
//
// Operator paths:
//   resolve_pending(handle, allow|deny) → new Decision, audited
//   execute_approved(handle)            → runs an approved action once;
//                                         a failure before it starts keeps
//                                         the approval
//   cancel(action_id)                   → signals in-flight, withdraws pending

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use redline_audit::{AuditEntry, AuditLog, AuditOutcome, AuditSink, ExecutionSummary};
use redline_credentials::{EnvBackend, ResolvedSecrets, SecretBroker, SecretScope};
use redline_policy::{
    Action, Decision, EvaluationContext, FileRuleStore, PolicyEngine, RuleSet, RuleStore,
    StaticRuleStore, Verdict,
};
use redline_quarantine::{QuarantineRecord, QuarantineStore};
use redline_sandbox::{
    DockerBackend, ExecutionBackend, ExecutionResult, ExitStatus, ProcessBackend, ResourceLimits,
    SandboxExecutor,
};

use crate::config::{BackendKind, GatewayConfig, Settings};
use crate::error::{MediationError, Stage};
use crate::outcome::{PendingHandle, QuarantineReceipt, Rejection, SubmitOutcome};
use crate::pending::{PendingAction, PendingState, PendingStore};
use crate::sanitize::OutputSanitizer;

/// The collaborators a gateway drives.
pub struct GatewayParts {
    pub engine: Arc<PolicyEngine>,
    /// Source for `reload_rules`. Without one, rules can only change by
    /// swapping them on the engine directly.
    pub rule_store: Option<Arc<dyn RuleStore>>,
    pub audit: Arc<dyn AuditSink>,
    pub quarantine: Arc<QuarantineStore>,
    pub pending: Arc<PendingStore>,
    pub broker: Arc<SecretBroker>,
    pub executor: Arc<SandboxExecutor>,
}

/// Per-stage timeouts. Sandbox execution is bounded by its own limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub policy: Duration,
    pub secrets: Duration,
}

impl StageTimeouts {
    fn from_settings(settings: &Settings) -> Self {
        Self {
            policy: Duration::from_millis(settings.policy.evaluation_timeout_ms),
            secrets: Duration::from_millis(settings.secrets.resolve_timeout_ms),
        }
    }
}

/// What `cancel` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The action was running; its environment is being torn down and the
    /// submission will report a Cancelled result.
    Signalled,
    /// The action was waiting for approval and will never run.
    Withdrawn,
}

pub struct MediationGateway {
    engine: Arc<PolicyEngine>,
    rule_store: Option<Arc<dyn RuleStore>>,
    audit: Arc<dyn AuditSink>,
    quarantine: Arc<QuarantineStore>,
    pending: Arc<PendingStore>,
    broker: Arc<SecretBroker>,
    executor: Arc<SandboxExecutor>,
    limits: ResourceLimits,
    timeouts: StageTimeouts,
    sanitizer: OutputSanitizer,
    attributes: BTreeMap<String, String>,
    in_flight: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl MediationGateway {
    pub fn new(parts: GatewayParts, settings: &Settings) -> Result<Self, MediationError> {
        Ok(Self {
            engine: parts.engine,
            rule_store: parts.rule_store,
            audit: parts.audit,
            quarantine: parts.quarantine,
            pending: parts.pending,
            broker: parts.broker,
            executor: parts.executor,
            limits: settings.sandbox.limits.clone(),
            timeouts: StageTimeouts::from_settings(settings),
            sanitizer: OutputSanitizer::new(&settings.sanitizer)?,
            attributes: BTreeMap::new(),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Build a gateway over the on-disk `.redline/` layout.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, MediationError> {
        let settings = &config.settings;

        let rule_store: Arc<dyn RuleStore> = if config.rules_file.exists() {
            Arc::new(FileRuleStore::new(&config.rules_file))
        } else {
            tracing::info!(
                path = %config.rules_file.display(),
                "no rule file; using the built-in rule set"
            );
            Arc::new(StaticRuleStore::new(RuleSet::builtin()))
        };
        let engine = PolicyEngine::from_store(rule_store.as_ref(), settings.policy.engine_config())?;

        let audit = AuditLog::open(&config.audit_log)
            .map_err(|e| MediationError::Config(format!("cannot open audit log: {e}")))?;
        let quarantine = QuarantineStore::open(&config.quarantine_dir, config.retention())?;
        let pending = PendingStore::open(&config.pending_dir)?;

        let credentials = Arc::new(EnvBackend::new(settings.secrets.env_prefix.clone()));
        let broker = SecretBroker::new(credentials, &settings.secrets.grants)
            .map_err(|e| MediationError::Config(e.to_string()))?;

        let backend: Arc<dyn ExecutionBackend> = match settings.sandbox.backend {
            BackendKind::Process => {
                let mut process = ProcessBackend::new(&config.sandbox_dir)
                    .with_network_isolation(settings.sandbox.isolate_network);
                if let Some(path) = &settings.sandbox.process_path {
                    process = process.with_path(path.clone());
                }
                Arc::new(process)
            }
            BackendKind::Docker => Arc::new(
                DockerBackend::new(settings.sandbox.image.clone())
                    .with_binary(settings.sandbox.docker_binary.clone()),
            ),
        };
        let executor = SandboxExecutor::new(backend, settings.sandbox.executor_config());

        Self::new(
            GatewayParts {
                engine: Arc::new(engine),
                rule_store: Some(rule_store),
                audit: Arc::new(audit),
                quarantine: Arc::new(quarantine),
                pending: Arc::new(pending),
                broker: Arc::new(broker),
                executor: Arc::new(executor),
            },
            settings,
        )
    }

    /// Attribute passed to every policy evaluation (e.g. `environment`).
    pub fn with_context_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    pub fn quarantine(&self) -> &QuarantineStore {
        &self.quarantine
    }

    pub fn pending(&self) -> &PendingStore {
        &self.pending
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    // ── Submission ───────────────────────────────────────────────

    /// Mediate one action.
    pub async fn submit(&self, action: Action) -> Result<SubmitOutcome, MediationError> {
        self.submit_with_cancel(action, CancellationToken::new()).await
    }

    /// Mediate one action, abandoning it when `cancel` fires.
    pub async fn submit_with_cancel(
        &self,
        action: Action,
        cancel: CancellationToken,
    ) -> Result<SubmitOutcome, MediationError> {
        let action_id = action.id();
        if cancel.is_cancelled() {
            self.record(AuditEntry::for_action(&action, AuditOutcome::Cancelled))
                .await?;
            return Err(MediationError::Cancelled(action_id));
        }

        let decision = match self.evaluate(&action).await {
            Ok(decision) => decision,
            Err(e) => {
                self.record(failed(&action, None, &e)).await?;
                return Err(e);
            }
        };

        tracing::info!(
            action_id = %action_id,
            kind = %action.kind(),
            verdict = %decision.verdict,
            rules = ?decision.rule_names(),
            "action evaluated"
        );

        match decision.verdict {
            Verdict::Deny => self.reject(&action, decision).await,
            Verdict::Quarantine => self.divert(&action, decision).await,
            Verdict::PendingApproval => self.hold(action, decision).await,
            Verdict::Allow => self.run(&action, decision, &cancel, None).await,
        }
    }

    async fn evaluate(&self, action: &Action) -> Result<Decision, MediationError> {
        let engine = Arc::clone(&self.engine);
        let owned = action.clone();
        let mut context = EvaluationContext::now();
        context.attributes = self.attributes.clone();

        let task = tokio::task::spawn_blocking(move || engine.evaluate(&owned, &context));
        match tokio::time::timeout(self.timeouts.policy, task).await {
            Ok(Ok(result)) => result.map_err(MediationError::from),
            Ok(Err(join)) => Err(MediationError::Policy(join.to_string())),
            Err(_) => Err(MediationError::StageTimeout {
                stage: Stage::PolicyEvaluation,
                timeout_ms: self.timeouts.policy.as_millis() as u64,
            }),
        }
    }

    async fn reject(&self, action: &Action, decision: Decision) -> Result<SubmitOutcome, MediationError> {
        self.record(AuditEntry::for_action(action, AuditOutcome::Rejected).with_decision(decision.clone()))
            .await?;
        Ok(SubmitOutcome::Denied(Rejection {
            action_id: action.id(),
            reason: decision.reason.clone(),
            decision,
        }))
    }

    async fn divert(&self, action: &Action, decision: Decision) -> Result<SubmitOutcome, MediationError> {
        let record = match self.store_payload(action).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(action_id = %action.id(), error = %e, "quarantine store unavailable");
                self.record(failed(action, Some(decision), &e)).await?;
                return Err(e);
            }
        };

        let entry = AuditEntry::for_action(
            action,
            AuditOutcome::Quarantined {
                content_hash: record.content_hash.clone(),
            },
        )
        .with_decision(decision.clone())
        .with_metadata(serde_json::json!({ "reference_count": record.reference_count }));
        self.record(entry).await?;

        Ok(SubmitOutcome::Quarantined(QuarantineReceipt {
            action_id: action.id(),
            content_hash: record.content_hash,
            expires_at: record.expires_at,
            reference_count: record.reference_count,
            decision,
        }))
    }

    async fn store_payload(&self, action: &Action) -> Result<QuarantineRecord, MediationError> {
        let store = Arc::clone(&self.quarantine);
        let payload = action.payload_bytes();
        let action_id = action.id();
        match tokio::task::spawn_blocking(move || store.put(&payload, action_id)).await {
            Ok(result) => result.map_err(MediationError::from),
            Err(join) => Err(MediationError::QuarantineStoreUnavailable(join.to_string())),
        }
    }

    async fn hold(&self, action: Action, decision: Decision) -> Result<SubmitOutcome, MediationError> {
        let pending = PendingAction::new(action, decision.clone());
        let saved = pending.clone();
        if let Err(e) = self.with_pending(move |store| store.save(&saved)).await {
            self.record(failed(&pending.action, Some(decision), &e)).await?;
            return Err(e);
        }

        let entry = AuditEntry::for_action(
            &pending.action,
            AuditOutcome::Pending {
                handle: pending.handle.to_string(),
            },
        )
        .with_decision(decision.clone());
        if let Err(e) = self.record(entry).await {
            // Without an audit record the handle must never become runnable.
            let handle = pending.handle;
            let _ = self
                .with_pending(move |store| {
                    store.transition(handle, PendingState::Awaiting, |p| {
                        p.state = PendingState::Cancelled
                    })
                })
                .await;
            return Err(e);
        }

        tracing::info!(
            action_id = %pending.action.id(),
            handle = %pending.handle,
            "action awaiting approval"
        );
        Ok(SubmitOutcome::Pending(PendingHandle {
            handle: pending.handle,
            action_id: pending.action.id(),
            decision,
        }))
    }

    /// Resolve secrets, execute, sanitize, audit.
    ///
    /// `claim` is the pending handle when an operator-approved action runs.
    async fn run(
        &self,
        action: &Action,
        decision: Decision,
        cancel: &CancellationToken,
        claim: Option<Uuid>,
    ) -> Result<SubmitOutcome, MediationError> {
        let action_id = action.id();
        let _registration = InFlight::register(&self.in_flight, action_id, cancel)?;

        let secrets = match self.resolve_secrets(action, cancel).await {
            Ok(secrets) => secrets,
            Err(e) => return self.fail_execution(action, decision, e, claim).await,
        };

        let executed = self
            .executor
            .execute(action, &secrets, &self.limits, cancel)
            .await;

        let mut result = match executed {
            Ok(result) => result,
            Err(e) => {
                let e = MediationError::from_sandbox(e, action_id);
                return self.fail_execution(action, decision, e, claim).await;
            }
        };

        let redactions = self.scrub(&mut result, &secrets);
        drop(secrets);

        let outcome = if result.is_cancelled() {
            AuditOutcome::Cancelled
        } else {
            AuditOutcome::Executed(summarize(&result, redactions))
        };
        let entry = AuditEntry::for_action(action, outcome)
            .with_decision(decision)
            .with_metadata(serde_json::json!({
                "backend": self.executor.backend_name(),
                "attempts": result.resource_usage.attempts,
            }));
        self.record(entry).await?;

        tracing::info!(
            action_id = %action_id,
            exit = ?result.exit_status,
            duration_ms = result.duration.as_millis() as u64,
            redactions,
            "action executed"
        );
        Ok(SubmitOutcome::Allowed(result))
    }

    /// Audit a failed execution and hand back the error.
    ///
    /// An approved action that failed before anything ran is released back
    /// to Approved and audited as deferred rather than terminal.
    async fn fail_execution(
        &self,
        action: &Action,
        decision: Decision,
        e: MediationError,
        claim: Option<Uuid>,
    ) -> Result<SubmitOutcome, MediationError> {
        match claim {
            Some(handle) if e.is_before_execution() => {
                let outcome = AuditOutcome::Deferred {
                    error_kind: e.kind().to_string(),
                    error: e.to_string(),
                };
                self.record(AuditEntry::for_action(action, outcome).with_decision(decision))
                    .await?;
                self.with_pending(move |store| {
                    store.transition(handle, PendingState::Executing, |p| {
                        p.state = PendingState::Approved
                    })
                })
                .await?;
                tracing::info!(
                    handle = %handle,
                    error = %e,
                    "approved action did not start; approval kept"
                );
            }
            _ => {
                self.record(execution_failed(action, decision, &e)).await?;
            }
        }
        Err(e)
    }

    async fn resolve_secrets(
        &self,
        action: &Action,
        cancel: &CancellationToken,
    ) -> Result<ResolvedSecrets, MediationError> {
        if action.secret_refs().is_empty() {
            return Ok(ResolvedSecrets::empty());
        }
        let scope = SecretScope::for_action(action);
        let resolve = self.broker.resolve_all(action.secret_refs(), &scope);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MediationError::Cancelled(action.id())),
            resolved = tokio::time::timeout(self.timeouts.secrets, resolve) => match resolved {
                Ok(Ok(secrets)) => Ok(secrets),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(MediationError::StageTimeout {
                    stage: Stage::SecretResolution,
                    timeout_ms: self.timeouts.secrets.as_millis() as u64,
                }),
            },
        }
    }

    fn scrub(&self, result: &mut ExecutionResult, secrets: &ResolvedSecrets) -> usize {
        let stdout = self.sanitizer.sanitize(&result.stdout, secrets.values());
        let stderr = self.sanitizer.sanitize(&result.stderr, secrets.values());
        result.stdout = stdout.text;
        result.stderr = stderr.text;
        stdout.redactions + stderr.redactions
    }

    /// Run a pending-store operation off the async runtime.
    async fn with_pending<T, F>(&self, op: F) -> Result<T, MediationError>
    where
        T: Send + 'static,
        F: FnOnce(&PendingStore) -> Result<T, MediationError> + Send + 'static,
    {
        let store = Arc::clone(&self.pending);
        match tokio::task::spawn_blocking(move || op(&store)).await {
            Ok(result) => result,
            Err(join) => Err(MediationError::PendingStore {
                path: PathBuf::new(),
                reason: join.to_string(),
            }),
        }
    }

    async fn record(&self, entry: AuditEntry) -> Result<u64, MediationError> {
        let audit = Arc::clone(&self.audit);
        let action_id = entry.action_id;
        let outcome = entry.outcome.label();
        match tokio::task::spawn_blocking(move || audit.append(entry)).await {
            Ok(Ok(seq)) => {
                tracing::debug!(seq, action_id = %action_id, outcome, "audit entry recorded");
                Ok(seq)
            }
            Ok(Err(e)) => {
                tracing::error!(action_id = %action_id, outcome, error = %e, "audit write failed");
                Err(e.into())
            }
            Err(join) => Err(MediationError::AuditWriteFailed(join.to_string())),
        }
    }

    // ── Operator paths ───────────────────────────────────────────

    /// Resolve a pending action to Allow or Deny.
    ///
    /// The resolution is a new Decision for the same action; the original
    /// PendingApproval decision is kept alongside it.
    pub async fn resolve_pending(
        &self,
        handle: Uuid,
        verdict: Verdict,
        reason: impl Into<String>,
        operator: impl Into<String>,
    ) -> Result<Decision, MediationError> {
        let state = match verdict {
            Verdict::Allow => PendingState::Approved,
            Verdict::Deny => PendingState::Denied,
            other => {
                return Err(MediationError::MalformedAction(format!(
                    "a pending action resolves to allow or deny, not {other}"
                )))
            }
        };

        let current = self.with_pending(move |store| store.load(handle)).await?;
        let decision = Decision::resolution(
            current.action.id(),
            verdict,
            reason,
            operator,
            Utc::now(),
        );

        let applied = decision.clone();
        let resolved = self
            .with_pending(move |store| {
                store.transition(handle, PendingState::Awaiting, move |p| {
                    p.resolution = Some(applied);
                    p.state = state;
                })
            })
            .await?;

        let outcome = match verdict {
            Verdict::Allow => AuditOutcome::Resolved,
            _ => AuditOutcome::Rejected,
        };
        self.record(AuditEntry::for_action(&resolved.action, outcome).with_decision(decision.clone()))
            .await?;

        tracing::info!(
            action_id = %resolved.action.id(),
            handle = %handle,
            verdict = %verdict,
            "pending action resolved"
        );
        Ok(decision)
    }

    /// Run an approved pending action. Succeeds at most once per handle.
    ///
    /// The handle is claimed (Approved → Executing) before anything runs, so
    /// concurrent callers cannot both execute it. If the action never
    /// started (busy pool, secrets unavailable) the claim is released and
    /// the approval can be used again.
    pub async fn execute_approved(
        &self,
        handle: Uuid,
        cancel: CancellationToken,
    ) -> Result<SubmitOutcome, MediationError> {
        let current = self.with_pending(move |store| store.load(handle)).await?;
        if current.state == PendingState::Denied {
            let reason = current
                .resolution
                .as_ref()
                .map(|d| d.reason.clone())
                .unwrap_or_default();
            return Err(MediationError::PolicyDenied {
                action_id: current.action.id(),
                reason,
            });
        }
        let decision = current.resolution.clone().ok_or_else(|| MediationError::PendingNotApproved {
            handle: handle.to_string(),
            state: current.state.to_string(),
            expected: PendingState::Approved.to_string(),
        })?;

        let claimed = self
            .with_pending(move |store| {
                store.transition(handle, PendingState::Approved, |p| {
                    p.state = PendingState::Executing
                })
            })
            .await?;

        let result = self.run(&claimed.action, decision, &cancel, Some(handle)).await;

        let settled = match &result {
            Err(e) if e.is_before_execution() => None,
            Err(MediationError::Cancelled(_)) => Some(PendingState::Cancelled),
            Ok(SubmitOutcome::Allowed(r)) if r.is_cancelled() => Some(PendingState::Cancelled),
            _ => Some(PendingState::Executed),
        };
        if let Some(state) = settled {
            let settle = self
                .with_pending(move |store| {
                    store.transition(handle, PendingState::Executing, |p| p.state = state)
                })
                .await;
            if let Err(e) = settle {
                tracing::warn!(handle = %handle, error = %e, "could not settle pending action");
            }
        }
        result
    }

    /// Cancel an action by id.
    ///
    /// A running action has its token cancelled; its submission records the
    /// terminal Cancelled result. A pending action is withdrawn and the
    /// cancellation is recorded here.
    pub async fn cancel(&self, action_id: Uuid) -> Result<CancelOutcome, MediationError> {
        let running = self
            .in_flight
            .lock()
            .map_err(|_| MediationError::Policy("in-flight registry lock poisoned".to_string()))?
            .get(&action_id)
            .cloned();
        if let Some(token) = running {
            token.cancel();
            tracing::info!(action_id = %action_id, "in-flight action cancelled");
            return Ok(CancelOutcome::Signalled);
        }

        let pending = self
            .with_pending(move |store| store.find_by_action(action_id))
            .await?
            .filter(|p| matches!(p.state, PendingState::Awaiting | PendingState::Approved))
            .ok_or_else(|| MediationError::PendingNotFound(action_id.to_string()))?;

        let (handle, expected) = (pending.handle, pending.state);
        let withdrawn = self
            .with_pending(move |store| {
                store.transition(handle, expected, |p| p.state = PendingState::Cancelled)
            })
            .await?;
        let decision = withdrawn.resolution.clone().unwrap_or(withdrawn.decision.clone());
        self.record(AuditEntry::for_action(&withdrawn.action, AuditOutcome::Cancelled).with_decision(decision))
            .await?;

        tracing::info!(action_id = %action_id, handle = %withdrawn.handle, "pending action withdrawn");
        Ok(CancelOutcome::Withdrawn)
    }

    // ── Maintenance ──────────────────────────────────────────────

    /// Reload the active rule set from the rule store. Returns its version.
    pub fn reload_rules(&self) -> Result<String, MediationError> {
        let store = self
            .rule_store
            .as_ref()
            .ok_or_else(|| MediationError::Config("gateway has no rule store to reload from".to_string()))?;
        let snapshot = self.engine.reload(store.as_ref())?;
        Ok(snapshot.version().to_string())
    }

    /// Periodically reclaim expired quarantine records until `cancel` fires.
    pub fn spawn_reclaimer(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(&self.quarantine);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let store = Arc::clone(&store);
                        match tokio::task::spawn_blocking(move || store.reclaim_expired(Utc::now())).await {
                            Ok(Ok(reclaimed)) if !reclaimed.is_empty() => {
                                tracing::info!(reclaimed = reclaimed.len(), "quarantine reclamation pass");
                            }
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => tracing::warn!(error = %e, "quarantine reclamation failed"),
                            Err(e) => tracing::warn!(error = %e, "quarantine reclamation task panicked"),
                        }
                    }
                }
            }
            tracing::debug!("quarantine reclaimer stopped");
        })
    }
}

/// Registers an action's token for `cancel` while it runs.
struct InFlight<'a> {
    registry: &'a Mutex<HashMap<Uuid, CancellationToken>>,
    action_id: Uuid,
}

impl<'a> InFlight<'a> {
    fn register(
        registry: &'a Mutex<HashMap<Uuid, CancellationToken>>,
        action_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Self, MediationError> {
        registry
            .lock()
            .map_err(|_| MediationError::Policy("in-flight registry lock poisoned".to_string()))?
            .insert(action_id, cancel.clone());
        Ok(Self {
            registry,
            action_id,
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.remove(&self.action_id);
        }
    }
}

fn failed(action: &Action, decision: Option<Decision>, e: &MediationError) -> AuditEntry {
    let entry = AuditEntry::for_action(
        action,
        AuditOutcome::Failed {
            error_kind: e.kind().to_string(),
            error: e.to_string(),
        },
    );
    match decision {
        Some(d) => entry.with_decision(d),
        None => entry,
    }
}

fn execution_failed(action: &Action, decision: Decision, e: &MediationError) -> AuditEntry {
    let outcome = match e {
        MediationError::Cancelled(_) => AuditOutcome::Cancelled,
        _ => AuditOutcome::ExecutionFailed {
            error_kind: e.kind().to_string(),
            error: e.to_string(),
        },
    };
    AuditEntry::for_action(action, outcome).with_decision(decision)
}

fn summarize(result: &ExecutionResult, redactions: usize) -> ExecutionSummary {
    ExecutionSummary {
        exit_status: match result.exit_status {
            ExitStatus::Exited(code) => Some(code),
            ExitStatus::Signaled(_) | ExitStatus::Cancelled => None,
        },
        stdout: result.stdout.clone(),
        stderr: result.stderr.clone(),
        truncated: result.truncated,
        duration_ms: result.duration.as_millis() as u64,
        redactions,
    }
}

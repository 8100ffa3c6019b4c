// executor.rs — SandboxExecutor: admission control, retries, teardown.
//
// execute(action, secrets, limits, cancel):
//
// 1. Build the ExecutionSpec (InvalidSpec on failure, nothing created)
// 2. Acquire a pool permit within the admission timeout → else Busy
// 3. Per attempt: create → run (raced against cancellation) → destroy
//    - Crash → destroy, back off, retry up to max_retries
//    - limit exceeded → destroy, surface, no retry
//    - cancelled → destroy, terminal Cancelled result
// 4. Release the permit
//
// The permit is held for the whole attempt loop so a retry never competes
// with new admissions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use redline_credentials::ResolvedSecrets;
use redline_policy::Action;

use crate::backend::{ExecutionBackend, RawOutput};
use crate::error::{LimitKind, SandboxError};
use crate::limits::{duration_ms, ResourceLimits};
use crate::spec::ExecutionSpec;

/// Pool and retry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Concurrent environments.
    pub pool_size: usize,
    /// How long a submission may wait for a free environment.
    pub admission_timeout: Duration,
    /// Extra attempts after a backend crash.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles per retry.
    pub retry_backoff: Duration,
    /// Slack beyond the wall-clock limit before the executor stops waiting
    /// on a backend that failed to enforce it.
    pub teardown_grace: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            admission_timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_backoff: Duration::from_millis(200),
            teardown_grace: Duration::from_secs(5),
        }
    }
}

/// How an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "code", rename_all = "snake_case")]
pub enum ExitStatus {
    Exited(i32),
    Signaled(i32),
    /// The caller cancelled while the action was running; the environment
    /// was torn down.
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub wall_ms: u64,
    pub attempts: u32,
    pub stdout_bytes: usize,
    pub stderr_bytes: usize,
}

/// The result of one executed action. Produced at most once per action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub action_id: Uuid,
    pub exit_status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    /// At least one stream hit the capture limit and carries the marker.
    pub truncated: bool,
    pub resource_usage: ResourceUsage,
    #[serde(with = "duration_ms", rename = "duration_ms")]
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_status == ExitStatus::Exited(0)
    }

    pub fn is_cancelled(&self) -> bool {
        self.exit_status == ExitStatus::Cancelled
    }

    fn cancelled(action_id: Uuid, attempts: u32, started: Instant) -> Self {
        let duration = started.elapsed();
        Self {
            action_id,
            exit_status: ExitStatus::Cancelled,
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
            resource_usage: ResourceUsage {
                wall_ms: duration.as_millis() as u64,
                attempts,
                ..ResourceUsage::default()
            },
            duration,
        }
    }

    fn from_raw(action_id: Uuid, raw: RawOutput, attempts: u32, started: Instant) -> Self {
        let exit_status = match (raw.exit_code, raw.signal) {
            (Some(code), _) => ExitStatus::Exited(code),
            (None, Some(sig)) => ExitStatus::Signaled(sig),
            (None, None) => ExitStatus::Exited(-1),
        };
        let duration = started.elapsed();
        Self {
            action_id,
            exit_status,
            resource_usage: ResourceUsage {
                wall_ms: raw.elapsed.as_millis() as u64,
                attempts,
                stdout_bytes: raw.stdout.len(),
                stderr_bytes: raw.stderr.len(),
            },
            stdout: String::from_utf8_lossy(&raw.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&raw.stderr).into_owned(),
            truncated: raw.truncated,
            duration,
        }
    }
}

enum Attempt {
    Finished(RawOutput),
    Cancelled,
}

pub struct SandboxExecutor {
    backend: Arc<dyn ExecutionBackend>,
    pool: Arc<Semaphore>,
    config: ExecutorConfig,
}

impl SandboxExecutor {
    pub fn new(backend: Arc<dyn ExecutionBackend>, config: ExecutorConfig) -> Self {
        let pool = Arc::new(Semaphore::new(config.pool_size.max(1)));
        Self {
            backend,
            pool,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Free environments right now.
    pub fn available(&self) -> usize {
        self.pool.available_permits()
    }

    /// Run `action` in a fresh environment.
    ///
    /// Cancellation before an environment is acquired returns
    /// `Err(Cancelled)`; cancellation while running returns a result whose
    /// exit status is `Cancelled`.
    pub async fn execute(
        &self,
        action: &Action,
        secrets: &ResolvedSecrets,
        limits: &ResourceLimits,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, SandboxError> {
        let spec = ExecutionSpec::from_action(action)?;
        let started = Instant::now();

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SandboxError::Cancelled),
            acquired = tokio::time::timeout(
                self.config.admission_timeout,
                Arc::clone(&self.pool).acquire_owned(),
            ) => match acquired {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(SandboxError::crash("sandbox pool is closed")),
                Err(_) => {
                    tracing::warn!(
                        action_id = %action.id(),
                        pool_size = self.config.pool_size,
                        "sandbox admission timed out"
                    );
                    return Err(SandboxError::Busy {
                        waited_ms: started.elapsed().as_millis() as u64,
                    });
                }
            },
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.attempt(&spec, secrets, limits, cancel).await {
                Ok(Attempt::Finished(raw)) => {
                    let result = ExecutionResult::from_raw(action.id(), raw, attempts, started);
                    tracing::info!(
                        action_id = %action.id(),
                        backend = self.backend.name(),
                        exit = ?result.exit_status,
                        attempts,
                        truncated = result.truncated,
                        "execution finished"
                    );
                    return Ok(result);
                }
                Ok(Attempt::Cancelled) => {
                    tracing::info!(action_id = %action.id(), "execution cancelled; environment torn down");
                    return Ok(ExecutionResult::cancelled(action.id(), attempts, started));
                }
                Err(SandboxError::Crash { reason, .. }) if attempts <= self.config.max_retries => {
                    let backoff = self.config.retry_backoff * 2u32.saturating_pow(attempts - 1);
                    tracing::warn!(
                        action_id = %action.id(),
                        attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        %reason,
                        "sandbox crashed; retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Ok(ExecutionResult::cancelled(action.id(), attempts, started));
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(SandboxError::Crash { reason, .. }) => {
                    tracing::error!(action_id = %action.id(), attempts, %reason, "sandbox crashed; giving up");
                    return Err(SandboxError::Crash { attempts, reason });
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// One create → run → destroy cycle. Destroy runs on every path once
    /// the environment exists.
    async fn attempt(
        &self,
        spec: &ExecutionSpec,
        secrets: &ResolvedSecrets,
        limits: &ResourceLimits,
        cancel: &CancellationToken,
    ) -> Result<Attempt, SandboxError> {
        let env = self.backend.create(limits).await?;
        let deadline = limits.timeout + self.config.teardown_grace;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Attempt::Cancelled),
            ran = tokio::time::timeout(deadline, self.backend.run(&env, spec, secrets, limits)) => {
                match ran {
                    Ok(result) => result.map(Attempt::Finished),
                    Err(_) => Err(SandboxError::ResourceLimitExceeded {
                        limit: LimitKind::WallClock,
                        detail: format!("backend did not stop within {} ms", deadline.as_millis()),
                    }),
                }
            }
        };

        if let Err(e) = self.backend.destroy(&env).await {
            tracing::error!(env = %env.id, error = %e, "sandbox teardown failed");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EnvironmentHandle;
    use async_trait::async_trait;
    use redline_policy::ActionKind;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A backend that replays scripted run results.
    #[derive(Default)]
    struct Scripted {
        script: Mutex<VecDeque<Result<RawOutput, SandboxError>>>,
        run_delay: Option<Duration>,
        created: AtomicUsize,
        destroyed: AtomicUsize,
    }

    impl Scripted {
        fn with(results: Vec<Result<RawOutput, SandboxError>>) -> Self {
            Self {
                script: Mutex::new(results.into()),
                ..Self::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                run_delay: Some(delay),
                ..Self::default()
            }
        }
    }

    fn ok(stdout: &str) -> Result<RawOutput, SandboxError> {
        Ok(RawOutput {
            exit_code: Some(0),
            stdout: stdout.as_bytes().to_vec(),
            ..RawOutput::default()
        })
    }

    #[async_trait]
    impl ExecutionBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn create(&self, _limits: &ResourceLimits) -> Result<EnvironmentHandle, SandboxError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(EnvironmentHandle {
                id: format!("env-{n}"),
                scratch: None,
            })
        }

        async fn run(
            &self,
            _env: &EnvironmentHandle,
            _spec: &ExecutionSpec,
            _secrets: &ResolvedSecrets,
            _limits: &ResourceLimits,
        ) -> Result<RawOutput, SandboxError> {
            if let Some(delay) = self.run_delay {
                tokio::time::sleep(delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ok("default"))
        }

        async fn destroy(&self, _env: &EnvironmentHandle) -> Result<(), SandboxError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            pool_size: 1,
            admission_timeout: Duration::from_millis(100),
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
            teardown_grace: Duration::from_millis(100),
        }
    }

    fn action() -> Action {
        Action::new(ActionKind::ShellExec, json!("echo hi"), "session-1")
    }

    async fn exec(
        executor: &SandboxExecutor,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, SandboxError> {
        executor
            .execute(&action(), &ResolvedSecrets::empty(), &ResourceLimits::default(), cancel)
            .await
    }

    #[tokio::test]
    async fn success_creates_and_destroys_once() {
        let backend = Arc::new(Scripted::with(vec![ok("hi\n")]));
        let executor = SandboxExecutor::new(backend.clone(), config());
        let result = exec(&executor, &CancellationToken::new()).await.unwrap();

        assert!(result.success());
        assert_eq!(result.stdout, "hi\n");
        assert_eq!(result.resource_usage.attempts, 1);
        assert_eq!(backend.created.load(Ordering::SeqCst), 1);
        assert_eq!(backend.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(executor.available(), 1);
    }

    #[tokio::test]
    async fn crashes_are_retried_then_succeed() {
        let backend = Arc::new(Scripted::with(vec![
            Err(SandboxError::crash("boom")),
            Err(SandboxError::crash("boom")),
            ok("third time"),
        ]));
        let executor = SandboxExecutor::new(backend.clone(), config());
        let result = exec(&executor, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.resource_usage.attempts, 3);
        assert_eq!(backend.destroyed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn crashes_surface_after_bounded_retries() {
        let backend = Arc::new(Scripted::with(
            (0..5).map(|_| Err(SandboxError::crash("down"))).collect(),
        ));
        let executor = SandboxExecutor::new(backend.clone(), config());
        let err = exec(&executor, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, SandboxError::Crash { attempts: 3, .. }));
        assert_eq!(backend.created.load(Ordering::SeqCst), 3);
        assert_eq!(backend.destroyed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn limit_exceeded_is_not_retried() {
        let backend = Arc::new(Scripted::with(vec![Err(SandboxError::ResourceLimitExceeded {
            limit: LimitKind::Memory,
            detail: "oom".to_string(),
        })]));
        let executor = SandboxExecutor::new(backend.clone(), config());
        let err = exec(&executor, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, SandboxError::ResourceLimitExceeded { .. }));
        assert_eq!(backend.created.load(Ordering::SeqCst), 1);
        assert_eq!(backend.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn full_pool_yields_busy_after_timeout() {
        let backend = Arc::new(Scripted::slow(Duration::from_millis(500)));
        let executor = Arc::new(SandboxExecutor::new(backend, config()));

        let holder = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move { exec(&executor, &CancellationToken::new()).await })
        };
        // Let the first execution take the only permit.
        while executor.available() > 0 {
            tokio::task::yield_now().await;
        }

        let started = Instant::now();
        let err = exec(&executor, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SandboxError::Busy { .. }));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_millis(450));

        assert!(holder.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn cancel_in_flight_tears_down_and_reports_cancelled() {
        let backend = Arc::new(Scripted::slow(Duration::from_secs(10)));
        let executor = SandboxExecutor::new(backend.clone(), config());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = exec(&executor, &cancel).await.unwrap();
        assert!(result.is_cancelled());
        assert_eq!(backend.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_before_admission_is_an_error() {
        let backend = Arc::new(Scripted::default());
        let executor = SandboxExecutor::new(backend.clone(), config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(exec(&executor, &cancel).await, Err(SandboxError::Cancelled)));
        assert_eq!(backend.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_action_never_touches_backend() {
        let backend = Arc::new(Scripted::default());
        let executor = SandboxExecutor::new(backend.clone(), config());
        let bad = Action::new(ActionKind::FileWrite, json!({"path": "../escape"}), "s");
        let err = executor
            .execute(&bad, &ResolvedSecrets::empty(), &ResourceLimits::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::InvalidSpec(_)));
        assert_eq!(backend.created.load(Ordering::SeqCst), 0);
    }
}

// broker.rs — SecretBroker: scoped, just-in-time secret resolution.
//
// Resolution is deny-by-default: a reference resolves only when some grant
// matches the secret name, the requesting session, and the action kind.
// Resolved values live in `ResolvedSecrets`, owned by exactly one sandbox
// execution and zeroized when it is dropped.

use std::fmt;
use std::sync::Arc;

use glob::Pattern;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use redline_policy::{Action, SecretRef};

use crate::backend::CredentialBackend;
use crate::error::CredentialError;

/// Shortest value the broker hands out. Output scrubbing replaces every
/// occurrence of a resolved value, which is only meaningful above this.
pub const MIN_SECRET_LEN: usize = 4;

/// Who a secret is being resolved for: one execution of one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretScope {
    pub action_id: Uuid,
    pub session: String,
    pub kind: String,
}

impl SecretScope {
    pub fn for_action(action: &Action) -> Self {
        Self {
            action_id: action.id(),
            session: action.requested_by().to_string(),
            kind: action.kind().to_string(),
        }
    }
}

impl fmt::Display for SecretScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} action {} (session {})", self.kind, self.action_id, self.session)
    }
}

/// Permission to resolve matching secrets.
///
/// ```toml
/// [[secrets.grants]]
/// secret = "github/*"
/// sessions = "ci-*"
/// kinds = ["network-call"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretGrant {
    /// Glob over secret names.
    pub secret: String,
    /// Glob over session identities.
    #[serde(default = "match_all")]
    pub sessions: String,
    /// Action kinds allowed to use the secret. Empty means any kind.
    #[serde(default)]
    pub kinds: Vec<String>,
}

fn match_all() -> String {
    "*".to_string()
}

impl SecretGrant {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            sessions: match_all(),
            kinds: Vec::new(),
        }
    }

    pub fn for_sessions(mut self, sessions: impl Into<String>) -> Self {
        self.sessions = sessions.into();
        self
    }

    pub fn for_kinds(mut self, kinds: &[&str]) -> Self {
        self.kinds = kinds.iter().map(|k| k.to_string()).collect();
        self
    }
}

struct CompiledGrant {
    secret: Pattern,
    sessions: Pattern,
    kinds: Vec<String>,
}

impl CompiledGrant {
    fn compile(grant: &SecretGrant) -> Result<Self, CredentialError> {
        let pattern = |p: &str| {
            Pattern::new(p).map_err(|e| CredentialError::InvalidGrant {
                pattern: p.to_string(),
                reason: e.to_string(),
            })
        };
        Ok(Self {
            secret: pattern(&grant.secret)?,
            sessions: pattern(&grant.sessions)?,
            kinds: grant.kinds.clone(),
        })
    }

    fn permits(&self, name: &str, scope: &SecretScope) -> bool {
        self.secret.matches(name)
            && self.sessions.matches(&scope.session)
            && (self.kinds.is_empty() || self.kinds.iter().any(|k| k == &scope.kind))
    }
}

/// A secret value valid for one execution.
pub struct EphemeralSecret {
    reference: String,
    env: String,
    value: SecretString,
}

impl EphemeralSecret {
    /// Reference identifier (`name` or `name@version`). Safe to log.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Environment variable the value binds to.
    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }
}

impl fmt::Debug for EphemeralSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralSecret")
            .field("reference", &self.reference)
            .field("env", &self.env)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// All secrets resolved for one execution.
#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    scope_action: Option<Uuid>,
    secrets: Vec<EphemeralSecret>,
}

impl ResolvedSecrets {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn action_id(&self) -> Option<Uuid> {
        self.scope_action
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EphemeralSecret> {
        self.secrets.iter()
    }

    /// `(env var, value)` pairs for the execution environment.
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.secrets.iter().map(|s| (s.env(), s.expose()))
    }

    /// Raw values, for output scrubbing.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.secrets.iter().map(|s| s.expose())
    }
}

pub struct SecretBroker {
    backend: Arc<dyn CredentialBackend>,
    grants: Vec<CompiledGrant>,
}

impl SecretBroker {
    pub fn new(
        backend: Arc<dyn CredentialBackend>,
        grants: &[SecretGrant],
    ) -> Result<Self, CredentialError> {
        let grants = grants
            .iter()
            .map(CompiledGrant::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { backend, grants })
    }

    /// Resolve one reference for one scope.
    pub async fn resolve(
        &self,
        secret_ref: &SecretRef,
        scope: &SecretScope,
    ) -> Result<EphemeralSecret, CredentialError> {
        if !self.grants.iter().any(|g| g.permits(&secret_ref.name, scope)) {
            tracing::warn!(
                secret = %secret_ref,
                action_id = %scope.action_id,
                session = %scope.session,
                "secret access denied"
            );
            return Err(CredentialError::AccessDenied {
                name: secret_ref.to_string(),
                scope: scope.to_string(),
            });
        }

        let value = self
            .backend
            .fetch(&secret_ref.name, secret_ref.version.as_deref())
            .await?;
        if value.expose_secret().len() < MIN_SECRET_LEN {
            tracing::warn!(secret = %secret_ref, action_id = %scope.action_id, "secret value too short");
            return Err(CredentialError::TooShort {
                name: secret_ref.to_string(),
                min: MIN_SECRET_LEN,
            });
        }

        tracing::debug!(
            secret = %secret_ref,
            backend = self.backend.name(),
            action_id = %scope.action_id,
            "secret resolved"
        );

        Ok(EphemeralSecret {
            reference: secret_ref.to_string(),
            env: secret_ref.env.clone(),
            value,
        })
    }

    /// Resolve every reference an action carries. Any failure fails the
    /// whole set; already-resolved values are dropped (and zeroized).
    pub async fn resolve_all(
        &self,
        refs: &[SecretRef],
        scope: &SecretScope,
    ) -> Result<ResolvedSecrets, CredentialError> {
        let mut secrets = Vec::with_capacity(refs.len());
        for r in refs {
            secrets.push(self.resolve(r, scope).await?);
        }
        Ok(ResolvedSecrets {
            scope_action: Some(scope.action_id),
            secrets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StaticBackend;
    use redline_policy::ActionKind;
    use serde_json::json;

    fn broker(grants: &[SecretGrant]) -> SecretBroker {
        let backend = StaticBackend::new()
            .with_secret("github/token", "ghp_value")
            .with_secret("aws/key", "aws_value");
        SecretBroker::new(Arc::new(backend), grants).unwrap()
    }

    fn scope(session: &str, kind: ActionKind) -> SecretScope {
        SecretScope::for_action(&Action::new(kind, json!("x"), session))
    }

    #[tokio::test]
    async fn no_grants_denies_everything() {
        let b = broker(&[]);
        let err = b
            .resolve(&SecretRef::new("github/token", "GH"), &scope("s", ActionKind::ShellExec))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn grant_matches_name_session_and_kind() {
        let b = broker(&[SecretGrant::new("github/*")
            .for_sessions("ci-*")
            .for_kinds(&["network-call"])]);
        let r = SecretRef::new("github/token", "GH_TOKEN");

        let ok = b.resolve(&r, &scope("ci-7", ActionKind::NetworkCall)).await.unwrap();
        assert_eq!(ok.expose(), "ghp_value");
        assert_eq!(ok.env(), "GH_TOKEN");

        assert!(b.resolve(&r, &scope("dev-1", ActionKind::NetworkCall)).await.is_err());
        assert!(b.resolve(&r, &scope("ci-7", ActionKind::ShellExec)).await.is_err());
        assert!(b
            .resolve(&SecretRef::new("aws/key", "AWS"), &scope("ci-7", ActionKind::NetworkCall))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn missing_value_is_not_found() {
        let b = broker(&[SecretGrant::new("*")]);
        let err = b
            .resolve(&SecretRef::new("nope", "X"), &scope("s", ActionKind::ShellExec))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::NotFound(_)));
    }

    #[tokio::test]
    async fn resolve_all_is_all_or_nothing() {
        let b = broker(&[SecretGrant::new("github/*")]);
        let refs = vec![
            SecretRef::new("github/token", "GH"),
            SecretRef::new("aws/key", "AWS"),
        ];
        assert!(b.resolve_all(&refs, &scope("s", ActionKind::ShellExec)).await.is_err());

        let resolved = b
            .resolve_all(&refs[..1], &scope("s", ActionKind::ShellExec))
            .await
            .unwrap();
        assert_eq!(resolved.env_pairs().collect::<Vec<_>>(), vec![("GH", "ghp_value")]);
    }

    #[tokio::test]
    async fn debug_output_never_shows_values() {
        let b = broker(&[SecretGrant::new("*")]);
        let resolved = b
            .resolve_all(
                &[SecretRef::new("github/token", "GH")],
                &scope("s", ActionKind::ShellExec),
            )
            .await
            .unwrap();
        let debug = format!("{:?}", resolved);
        assert!(!debug.contains("ghp_value"));
        assert!(debug.contains("github/token"));
    }

    #[tokio::test]
    async fn short_values_are_refused() {
        let backend = StaticBackend::new().with_secret("pin", "k9Z");
        let b = SecretBroker::new(Arc::new(backend), &[SecretGrant::new("*")]).unwrap();
        let err = b
            .resolve(&SecretRef::new("pin", "PIN"), &scope("s", ActionKind::ShellExec))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::TooShort { min: MIN_SECRET_LEN, .. }));
        assert!(!err.to_string().contains("k9Z"));
    }

    #[test]
    fn invalid_grant_rejected() {
        let backend = Arc::new(StaticBackend::new());
        assert!(matches!(
            SecretBroker::new(backend, &[SecretGrant::new("[")]),
            Err(CredentialError::InvalidGrant { .. })
        ));
    }
}

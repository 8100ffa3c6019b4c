// backend.rs — Credential backends.
//
// A backend is keyed lookup by secret name and optional version. Only the
// broker calls backends.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::CredentialError;

/// Default prefix for [`EnvBackend`] variables.
pub const DEFAULT_ENV_PREFIX: &str = "REDLINE_SECRET_";

#[async_trait]
pub trait CredentialBackend: Send + Sync {
    /// Backend name, for errors and logs.
    fn name(&self) -> &str;

    /// Fetch a secret value. `version = None` means latest.
    async fn fetch(&self, name: &str, version: Option<&str>) -> Result<SecretString, CredentialError>;
}

/// Reads secrets from the broker process's environment.
///
/// `github/deploy-token` maps to `REDLINE_SECRET_GITHUB_DEPLOY_TOKEN`; a
/// pinned version `3` maps to `REDLINE_SECRET_GITHUB_DEPLOY_TOKEN__3`.
pub struct EnvBackend {
    prefix: String,
}

impl EnvBackend {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn var_name(&self, name: &str, version: Option<&str>) -> String {
        let mut var = format!("{}{}", self.prefix, normalize(name));
        if let Some(v) = version {
            var.push_str("__");
            var.push_str(&normalize(v));
        }
        var
    }
}

impl Default for EnvBackend {
    fn default() -> Self {
        Self::new(DEFAULT_ENV_PREFIX)
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl CredentialBackend for EnvBackend {
    fn name(&self) -> &str {
        "env"
    }

    async fn fetch(&self, name: &str, version: Option<&str>) -> Result<SecretString, CredentialError> {
        let var = self.var_name(name, version);
        std::env::var(&var)
            .map(SecretString::from)
            .map_err(|_| CredentialError::NotFound(name.to_string()))
    }
}

/// Fixed in-memory secrets (tests, embedding).
#[derive(Default)]
pub struct StaticBackend {
    secrets: HashMap<(String, Option<String>), SecretString>,
}

impl StaticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add the latest value of a secret.
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets
            .insert((name.into(), None), SecretString::from(value.into()));
        self
    }

    /// Builder: add a specific version of a secret.
    pub fn with_versioned_secret(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.secrets.insert(
            (name.into(), Some(version.into())),
            SecretString::from(value.into()),
        );
        self
    }
}

#[async_trait]
impl CredentialBackend for StaticBackend {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, name: &str, version: Option<&str>) -> Result<SecretString, CredentialError> {
        self.secrets
            .get(&(name.to_string(), version.map(str::to_string)))
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn env_var_names_are_normalized() {
        let backend = EnvBackend::default();
        assert_eq!(
            backend.var_name("github/deploy-token", None),
            "REDLINE_SECRET_GITHUB_DEPLOY_TOKEN"
        );
        assert_eq!(
            backend.var_name("db.password", Some("v2")),
            "REDLINE_SECRET_DB_PASSWORD__V2"
        );
    }

    #[tokio::test]
    async fn env_backend_reads_process_env() {
        let backend = EnvBackend::new("REDLINE_TEST_ENV_BACKEND_");
        std::env::set_var("REDLINE_TEST_ENV_BACKEND_API_KEY", "s3cr3t");
        let value = backend.fetch("api-key", None).await.unwrap();
        assert_eq!(value.expose_secret(), "s3cr3t");
        assert!(matches!(
            backend.fetch("missing", None).await,
            Err(CredentialError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn static_backend_distinguishes_versions() {
        let backend = StaticBackend::new()
            .with_secret("token", "latest")
            .with_versioned_secret("token", "1", "old");
        assert_eq!(backend.fetch("token", None).await.unwrap().expose_secret(), "latest");
        assert_eq!(backend.fetch("token", Some("1")).await.unwrap().expose_secret(), "old");
        assert!(backend.fetch("token", Some("9")).await.is_err());
    }
}

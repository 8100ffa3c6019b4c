// sanitize.rs — Scrub credentials from execution output before it is
// audited or returned.
//
// Two passes:
//   1. every secret value resolved for this execution, verbatim
//   2. well-known credential shapes (cloud keys, tokens, private keys, ...)
//
// Email and IPv4 redaction are opt-in.

use regex::Regex;

use crate::config::SanitizerSection;
use crate::error::MediationError;

/// Replacement for a resolved secret value found in output.
pub const SECRET_VALUE_REPLACEMENT: &str = "[REDACTED_SECRET_VALUE]";

const PATTERNS: &[(&str, &str, &str)] = &[
    ("aws_access_key", r"(?i)AKIA[0-9A-Z]{16}", "[REDACTED_AWS_ACCESS_KEY]"),
    (
        "aws_secret_key",
        r#"(?i)aws_secret_access_key['"]?\s*[:=]\s*['"]?[a-zA-Z0-9/+=]{40}"#,
        "[REDACTED_AWS_SECRET_KEY]",
    ),
    (
        "api_key",
        r#"(?i)(api[_-]?key|apikey)['"]?\s*[:=]\s*['"]?[a-zA-Z0-9_\-]{20,}"#,
        "[REDACTED_API_KEY]",
    ),
    (
        "secret",
        r#"(?i)(secret|password|passwd)['"]?\s*[:=]\s*['"]?[a-zA-Z0-9_@#$%^&*\-!]{8,}"#,
        "[REDACTED_SECRET]",
    ),
    (
        "private_key",
        r"(?i)-----BEGIN (RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----",
        "[REDACTED_PRIVATE_KEY]",
    ),
    ("jwt", r"eyJ[a-zA-Z0-9_-]+\.eyJ[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+", "[REDACTED_JWT_TOKEN]"),
    ("bearer_token", r"(?i)Bearer\s+[a-zA-Z0-9_\-\.]+", "[REDACTED_BEARER_TOKEN]"),
    ("basic_auth", r"(?i)Basic\s+[a-zA-Z0-9+/=]+", "[REDACTED_BASIC_AUTH]"),
    ("github_token", r"gh[pousr]_[a-zA-Z0-9]{36,}", "[REDACTED_GITHUB_TOKEN]"),
    ("slack_token", r"xox[baprs]-[a-zA-Z0-9\-]+", "[REDACTED_SLACK_TOKEN]"),
    ("stripe_key", r"sk_live_[a-zA-Z0-9]{24,}", "[REDACTED_STRIPE_KEY]"),
    ("google_api", r"AIza[a-zA-Z0-9_\-]{35}", "[REDACTED_GOOGLE_API_KEY]"),
    ("ssh_key", r"ssh-rsa\s+[a-zA-Z0-9+/=]+", "[REDACTED_SSH_KEY]"),
    (
        "connection_string",
        r"(?i)(mongodb|postgresql|mysql)://\S+",
        "[REDACTED_CONNECTION_STRING]",
    ),
];

const EMAIL: (&str, &str, &str) = (
    "email",
    r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
    "[REDACTED_EMAIL]",
);

const IPV4: (&str, &str, &str) = ("ipv4", r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b", "[REDACTED_IP]");

struct Pattern {
    name: &'static str,
    regex: Regex,
    replacement: &'static str,
}

/// Result of sanitizing one string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub text: String,
    /// Total replacements made.
    pub redactions: usize,
    /// Names of the pattern kinds that fired (`secret_value` for verbatim hits).
    pub kinds: Vec<&'static str>,
}

pub struct OutputSanitizer {
    patterns: Vec<Pattern>,
}

impl OutputSanitizer {
    pub fn new(config: &SanitizerSection) -> Result<Self, MediationError> {
        let mut specs: Vec<(&'static str, &'static str, &'static str)> = PATTERNS.to_vec();
        if config.redact_emails {
            specs.push(EMAIL);
        }
        if config.redact_ips {
            specs.push(IPV4);
        }
        let patterns = specs
            .into_iter()
            .map(|(name, pattern, replacement)| {
                Regex::new(pattern)
                    .map(|regex| Pattern {
                        name,
                        regex,
                        replacement,
                    })
                    .map_err(|e| MediationError::Config(format!("sanitizer pattern {name}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Scrub `text`, first of the given secret values, then of known shapes.
    pub fn sanitize<'a>(&self, text: &str, secrets: impl IntoIterator<Item = &'a str>) -> Sanitized {
        let mut out = text.to_string();
        let mut redactions = 0;
        let mut kinds = Vec::new();

        // Longest first, so a secret containing another is removed whole.
        let mut values: Vec<&str> = secrets
            .into_iter()
            .filter(|v| !v.is_empty())
            .collect();
        values.sort_by_key(|v| std::cmp::Reverse(v.len()));
        for value in values {
            let hits = out.matches(value).count();
            if hits > 0 {
                out = out.replace(value, SECRET_VALUE_REPLACEMENT);
                redactions += hits;
                if !kinds.contains(&"secret_value") {
                    kinds.push("secret_value");
                }
            }
        }

        for pattern in &self.patterns {
            let hits = pattern.regex.find_iter(&out).count();
            if hits > 0 {
                tracing::warn!(pattern = pattern.name, count = hits, "sensitive output redacted");
                out = pattern.regex.replace_all(&out, pattern.replacement).into_owned();
                redactions += hits;
                kinds.push(pattern.name);
            }
        }

        Sanitized {
            text: out,
            redactions,
            kinds,
        }
    }
}

impl Default for OutputSanitizer {
    fn default() -> Self {
        let patterns = PATTERNS
            .iter()
            .filter_map(|&(name, pattern, replacement)| {
                Regex::new(pattern).ok().map(|regex| Pattern {
                    name,
                    regex,
                    replacement,
                })
            })
            .collect();
        Self { patterns }
    }
}

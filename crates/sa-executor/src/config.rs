use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Executor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Per-attempt deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Total attempts for transient transport errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff; attempt `n` waits `n * retry_delay_ms`.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Concurrent calls in batch mode.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Header names whose unresolved `${...}` placeholders are sent as-is
    /// instead of dropped.
    #[serde(default)]
    pub passthrough_headers: Vec<String>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_concurrent() -> usize {
    5
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_concurrent: default_max_concurrent(),
            passthrough_headers: Vec::new(),
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Wait before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Secrets substituted into header templates.
#[derive(Clone, Default, PartialEq, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("auth_token", &redact(&self.auth_token))
            .field("api_key", &redact(&self.api_key))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .finish()
    }
}

impl Credentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            auth_token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Base64 `username:password`, when a username is set.
    pub fn basic_credentials(&self) -> Option<String> {
        let username = self.username.as_deref()?;
        let password = self.password.as_deref().unwrap_or_default();
        Some(STANDARD.encode(format!("{username}:{password}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let c = ExecutorConfig::default();
        assert_eq!(c.timeout(), Duration::from_secs(30));
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.max_concurrent, 5);
        assert!(c.passthrough_headers.is_empty());
    }

    #[test]
    fn config_from_toml() {
        let c: ExecutorConfig = toml::from_str(
            r#"
timeout_ms = 500
retry_delay_ms = 20
passthrough_headers = ["X-Trace"]
"#,
        )
        .unwrap();
        assert_eq!(c.timeout_ms, 500);
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.backoff(3), Duration::from_millis(60));
        assert_eq!(c.passthrough_headers, ["X-Trace"]);
    }

    #[test]
    fn basic_credentials_encoding() {
        let c = Credentials::basic("aladdin", "opensesame");
        assert_eq!(
            c.basic_credentials().as_deref(),
            Some("YWxhZGRpbjpvcGVuc2VzYW1l")
        );
        assert_eq!(Credentials::default().basic_credentials(), None);
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = Credentials {
            auth_token: Some("tok-123".into()),
            password: Some("hunter2".into()),
            username: Some("bob".into()),
            ..Credentials::default()
        };
        let shown = format!("{c:?}");
        assert!(!shown.contains("tok-123"));
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("bob"));
    }
}

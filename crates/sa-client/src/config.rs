//! Client configuration, loadable from TOML.

use std::path::Path;

use sa_cache::CacheConfig;
use sa_executor::{Credentials, ExecutorConfig};
use sa_router::Policy;
use serde::Deserialize;

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    /// Routing thresholds, cache sizing, TTLs, and telemetry.
    #[serde(default)]
    pub policy: Policy,
    /// HTTP timeouts, retries, and batch concurrency.
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Secrets for header templates. Usually left out of files and set
    /// through the builder.
    #[serde(default)]
    pub credentials: Credentials,
}

impl ClientConfig {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.policy.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file path.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Cache sizing derived from the policy.
    pub fn cache_config(&self) -> CacheConfig {
        cache_config(&self.policy)
    }
}

pub(crate) fn cache_config(policy: &Policy) -> CacheConfig {
    CacheConfig {
        max_entries: policy.max_cache_entries,
        max_bytes: policy.max_cache_bytes(),
        enable_semantic: policy.enable_semantic_cache,
        semantic_radius: policy.semantic_cache_radius,
    }
}

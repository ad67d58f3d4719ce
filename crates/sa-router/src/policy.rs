//! Routing policy: decision thresholds, cache TTLs, and telemetry settings.
//!
//! Loadable from TOML or JSON, from `SOCKET_AGENT_*` environment variables,
//! or from one of the named presets.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use sa_protocol::Decision;
use serde::{Deserialize, Serialize};

use crate::error::{RouterError, RouterResult};
use crate::stubs::Stub;

/// Candidate reranker selected by the policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankerBackend {
    #[default]
    None,
    /// Built-in feature-weighted linear reranker.
    Linear,
}

impl FromStr for RerankerBackend {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "linear" => Ok(Self::Linear),
            other => Err(RouterError::Policy(format!(
                "unknown reranker backend '{other}'"
            ))),
        }
    }
}

/// Telemetry recording settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ring buffer size for raw events.
    #[serde(default = "default_telemetry_capacity")]
    pub capacity: usize,
    /// How often a summary is logged.
    #[serde(default = "default_export_interval")]
    pub export_interval_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_telemetry_capacity(),
            export_interval_secs: default_export_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_telemetry_capacity() -> usize {
    10_000
}

fn default_export_interval() -> u64 {
    300
}

fn default_short_circuit() -> f64 {
    0.88
}

fn default_confirm() -> f64 {
    0.70
}

fn default_ttl() -> u64 {
    300
}

fn default_radius() -> f32 {
    0.85
}

fn default_max_entries() -> usize {
    1000
}

fn default_max_size_mb() -> u64 {
    100
}

/// Central thresholds and configuration.
///
/// `confirm_threshold <= short_circuit_threshold` is enforced by
/// [`validate`](Self::validate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default = "default_short_circuit")]
    pub short_circuit_threshold: f64,
    #[serde(default = "default_confirm")]
    pub confirm_threshold: f64,
    /// Cache TTL in seconds when neither the stub nor an override sets one.
    #[serde(default = "default_ttl")]
    pub cache_ttl_default: u64,
    #[serde(default)]
    pub enable_semantic_cache: bool,
    #[serde(default = "default_radius")]
    pub semantic_cache_radius: f32,
    #[serde(default = "default_max_entries")]
    pub max_cache_entries: usize,
    #[serde(default = "default_max_size_mb")]
    pub max_cache_size_mb: u64,
    /// Per-stub TTL overrides (seconds), keyed by stub name.
    #[serde(default)]
    pub endpoint_ttls: BTreeMap<String, u64>,
    #[serde(default)]
    pub reranker: RerankerBackend,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            short_circuit_threshold: default_short_circuit(),
            confirm_threshold: default_confirm(),
            cache_ttl_default: default_ttl(),
            enable_semantic_cache: false,
            semantic_cache_radius: default_radius(),
            max_cache_entries: default_max_entries(),
            max_cache_size_mb: default_max_size_mb(),
            endpoint_ttls: BTreeMap::new(),
            reranker: RerankerBackend::None,
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Named policy presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyPreset {
    /// Maximise direct calls at the cost of occasional misroutes.
    Aggressive,
    Balanced,
    /// Prefer the interpreter unless routing is very certain.
    Conservative,
    Development,
    Production,
}

impl fmt::Display for PolicyPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Aggressive => "aggressive",
            Self::Balanced => "balanced",
            Self::Conservative => "conservative",
            Self::Development => "development",
            Self::Production => "production",
        };
        f.write_str(name)
    }
}

impl FromStr for PolicyPreset {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aggressive" => Ok(Self::Aggressive),
            "balanced" => Ok(Self::Balanced),
            "conservative" => Ok(Self::Conservative),
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            other => Err(RouterError::Policy(format!("unknown preset '{other}'"))),
        }
    }
}

impl Policy {
    pub fn preset(preset: PolicyPreset) -> Self {
        let base = Self::default();
        match preset {
            PolicyPreset::Balanced => base,
            PolicyPreset::Aggressive => Self {
                short_circuit_threshold: 0.75,
                confirm_threshold: 0.60,
                cache_ttl_default: 600,
                enable_semantic_cache: true,
                semantic_cache_radius: 0.80,
                ..base
            },
            PolicyPreset::Conservative => Self {
                short_circuit_threshold: 0.95,
                confirm_threshold: 0.85,
                cache_ttl_default: 180,
                enable_semantic_cache: false,
                ..base
            },
            PolicyPreset::Development => Self {
                short_circuit_threshold: 0.80,
                confirm_threshold: 0.60,
                cache_ttl_default: 60,
                enable_semantic_cache: true,
                semantic_cache_radius: 0.75,
                telemetry: TelemetryConfig {
                    export_interval_secs: 60,
                    ..TelemetryConfig::default()
                },
                ..base
            },
            PolicyPreset::Production => Self {
                short_circuit_threshold: 0.90,
                confirm_threshold: 0.75,
                cache_ttl_default: 300,
                enable_semantic_cache: false,
                telemetry: TelemetryConfig {
                    export_interval_secs: 3600,
                    ..TelemetryConfig::default()
                },
                ..base
            },
        }
    }

    /// Resolve a preset by name.
    pub fn named(name: &str) -> RouterResult<Self> {
        Ok(Self::preset(name.parse()?))
    }

    /// Check threshold ranges and ordering.
    pub fn validate(&self) -> RouterResult<()> {
        for (name, value) in [
            ("short_circuit_threshold", self.short_circuit_threshold),
            ("confirm_threshold", self.confirm_threshold),
            ("semantic_cache_radius", f64::from(self.semantic_cache_radius)),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RouterError::Policy(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.confirm_threshold > self.short_circuit_threshold {
            return Err(RouterError::Policy(format!(
                "confirm_threshold ({}) exceeds short_circuit_threshold ({})",
                self.confirm_threshold, self.short_circuit_threshold
            )));
        }
        Ok(())
    }

    pub fn should_short_circuit(&self, confidence: f64) -> bool {
        confidence >= self.short_circuit_threshold
    }

    pub fn should_confirm(&self, confidence: f64) -> bool {
        confidence >= self.confirm_threshold && confidence < self.short_circuit_threshold
    }

    pub fn should_fallback(&self, confidence: f64) -> bool {
        confidence < self.confirm_threshold
    }

    pub fn decide(&self, confidence: f64) -> Decision {
        if self.should_short_circuit(confidence) {
            Decision::Direct
        } else if self.should_confirm(confidence) {
            Decision::Confirm
        } else {
            Decision::Fallback
        }
    }

    /// Effective cache TTL in seconds: the stub's own hint, then a
    /// per-endpoint override, then the global default.
    pub fn ttl_for(&self, stub: &Stub) -> u64 {
        stub.cache_ttl
            .filter(|&ttl| ttl > 0)
            .or_else(|| self.endpoint_ttls.get(&stub.name).copied())
            .unwrap_or(self.cache_ttl_default)
    }

    pub fn max_cache_bytes(&self) -> usize {
        (self.max_cache_size_mb as usize).saturating_mul(1024 * 1024)
    }

    /// Load from `SOCKET_AGENT_*` environment variables.
    ///
    /// `SOCKET_AGENT_PRESET` picks the base policy; individual variables
    /// override it. Unparseable values are ignored with a warning.
    pub fn from_env() -> RouterResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> RouterResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut policy = match lookup("SOCKET_AGENT_PRESET") {
            Some(name) => Self::named(&name)?,
            None => Self::default(),
        };

        fn parsed<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "ignoring unparseable policy variable");
                    None
                }
            }
        }
        let flag = |key: &str| {
            lookup(key).map(|v| v.eq_ignore_ascii_case("true") || v.trim() == "1")
        };

        let key = "SOCKET_AGENT_SHORT_CIRCUIT_THRESHOLD";
        if let Some(v) = parsed(key, lookup(key)) {
            policy.short_circuit_threshold = v;
        }
        let key = "SOCKET_AGENT_CONFIRM_THRESHOLD";
        if let Some(v) = parsed(key, lookup(key)) {
            policy.confirm_threshold = v;
        }
        let key = "SOCKET_AGENT_CACHE_TTL";
        if let Some(v) = parsed(key, lookup(key)) {
            policy.cache_ttl_default = v;
        }
        if let Some(v) = flag("SOCKET_AGENT_SEMANTIC_CACHE") {
            policy.enable_semantic_cache = v;
        }
        let key = "SOCKET_AGENT_SEMANTIC_RADIUS";
        if let Some(v) = parsed(key, lookup(key)) {
            policy.semantic_cache_radius = v;
        }
        let key = "SOCKET_AGENT_MAX_CACHE_ENTRIES";
        if let Some(v) = parsed(key, lookup(key)) {
            policy.max_cache_entries = v;
        }
        let key = "SOCKET_AGENT_MAX_CACHE_MB";
        if let Some(v) = parsed(key, lookup(key)) {
            policy.max_cache_size_mb = v;
        }
        if let Some(raw) = lookup("SOCKET_AGENT_RERANKER") {
            policy.reranker = raw.parse()?;
        }
        if let Some(v) = flag("SOCKET_AGENT_TELEMETRY") {
            policy.telemetry.enabled = v;
        }
        let key = "SOCKET_AGENT_TELEMETRY_INTERVAL";
        if let Some(v) = parsed(key, lookup(key)) {
            policy.telemetry.export_interval_secs = v;
        }

        policy.validate()?;
        Ok(policy)
    }

    /// Parse and validate a TOML policy document.
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let policy: Self = toml::from_str(raw)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load from a `.json` or TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let policy: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents)?
        } else {
            toml::from_str(&contents)?
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Write as `.json` or TOML depending on the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let contents = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };
        std::fs::write(path, contents)?;
        Ok(())
    }
}

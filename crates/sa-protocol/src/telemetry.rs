use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::Via;

/// One recorded call, direct or interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    /// Stub name, or a synthetic name such as `llm_fallback`.
    pub endpoint: String,
    pub via: Via,
    /// Interpreter tokens consumed (0 for direct calls).
    pub tokens: u64,
    pub latency_ms: f64,
    pub success: bool,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl TelemetryEvent {
    pub fn new(endpoint: impl Into<String>, via: Via) -> Self {
        Self {
            timestamp: Utc::now(),
            endpoint: endpoint.into(),
            via,
            tokens: 0,
            latency_ms: 0.0,
            success: true,
            cache_hit: false,
            confidence: None,
        }
    }

    pub fn tokens(mut self, tokens: u64) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

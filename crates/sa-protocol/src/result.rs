use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a call reached the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Via {
    /// Routed by local rules without an interpreter round-trip.
    Direct,
    /// Needed (or was handed to) the external interpreter.
    Llm,
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Llm => f.write_str("llm"),
        }
    }
}

/// Result of one executed (or cached) API call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResult {
    pub success: bool,
    /// HTTP status, or 0 when no response was received.
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: f64,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub cache_hit: bool,
}

impl ApiResult {
    pub fn failure(error: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            success: false,
            status_code: 0,
            result: None,
            rendered_text: None,
            error: Some(error.into()),
            duration_ms,
            tokens_used: 0,
            cache_hit: false,
        }
    }

    pub fn from_cache(value: Value, duration_ms: f64) -> Self {
        Self {
            success: true,
            status_code: 200,
            result: Some(value),
            rendered_text: None,
            error: None,
            duration_ms,
            tokens_used: 0,
            cache_hit: true,
        }
    }

    pub fn with_rendered(mut self, text: impl Into<String>) -> Self {
        self.rendered_text = Some(text.into());
        self
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::descriptor::HttpMethod;

/// Endpoint name reported when nothing matched.
pub const UNKNOWN_ENDPOINT: &str = "unknown";

/// What to do with a routed request.
///
/// Variants are declared in ascending order of confidence so that the
/// derived `Ord` matches threshold classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Hand the text to the external interpreter.
    Fallback,
    /// Execute, but the caller may want to confirm first.
    Confirm,
    /// Execute immediately.
    Direct,
}

/// Which matcher produced a routing candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Pattern,
    Keyword,
    Action,
}

impl MatchKind {
    /// Tie-break rank among equal-confidence candidates (higher wins).
    pub fn priority(&self) -> u8 {
        match self {
            Self::Pattern => 3,
            Self::Action => 2,
            Self::Keyword => 1,
        }
    }
}

/// Outcome of routing one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    /// Stub name, or [`UNKNOWN_ENDPOINT`].
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    pub path: String,
    pub args: Map<String, Value>,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub decision: Decision,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_kind: Option<MatchKind>,
}

impl RouteResult {
    pub fn unmatched(reasoning: impl Into<String>) -> Self {
        Self {
            endpoint: UNKNOWN_ENDPOINT.into(),
            method: None,
            path: String::new(),
            args: Map::new(),
            confidence: 0.0,
            decision: Decision::Fallback,
            reasoning: reasoning.into(),
            match_kind: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.endpoint != UNKNOWN_ENDPOINT
    }
}

//! Optional candidate rescoring.

use std::fmt;
use std::sync::Arc;

use crate::policy::RerankerBackend;
use crate::stubs::{Stub, leading_resource};
use crate::vocab::{method_keywords, tokenize};

/// Rescores a routing candidate. Returned scores are clamped to `[0, 1]`
/// by the caller.
pub trait Reranker: Send + Sync + fmt::Debug {
    fn score(&self, text: &str, stub: &Stub) -> f64;
}

/// Feature-weighted linear reranker over keyword overlap, method verbs,
/// and resource mention.
#[derive(Debug, Clone, Copy)]
pub struct LinearReranker {
    pub keyword_weight: f64,
    pub verb_weight: f64,
    pub resource_weight: f64,
}

impl Default for LinearReranker {
    fn default() -> Self {
        Self {
            keyword_weight: 0.5,
            verb_weight: 0.3,
            resource_weight: 0.2,
        }
    }
}

impl Reranker for LinearReranker {
    fn score(&self, text: &str, stub: &Stub) -> f64 {
        let tokens = tokenize(text);

        let overlap = if stub.keywords.is_empty() {
            0.0
        } else {
            stub.keywords.iter().filter(|k| tokens.contains(k)).count() as f64
                / stub.keywords.len() as f64
        };
        let verb = method_keywords(stub.method)
            .iter()
            .any(|v| tokens.iter().any(|t| t == v));
        let resource = leading_resource(&stub.path)
            .is_some_and(|r| tokens.iter().any(|t| t.starts_with(&r)));

        let total = self.keyword_weight + self.verb_weight + self.resource_weight;
        if total <= 0.0 {
            return 0.0;
        }
        let raw = self.keyword_weight * overlap
            + self.verb_weight * f64::from(u8::from(verb))
            + self.resource_weight * f64::from(u8::from(resource));
        (raw / total).clamp(0.0, 1.0)
    }
}

/// Build the reranker selected by policy, if any.
pub fn from_backend(backend: RerankerBackend) -> Option<Arc<dyn Reranker>> {
    match backend {
        RerankerBackend::None => None,
        RerankerBackend::Linear => Some(Arc::new(LinearReranker::default())),
    }
}

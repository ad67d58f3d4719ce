//! Rules engine: free text to a routed stub call.
//!
//! Three matchers run independently over the current stub snapshot:
//! compiled patterns, keyword overlap, and action verb + resource. The best
//! candidate is rescored, its parameters extracted, and the confidence
//! classified by [`Policy`].

use std::sync::Arc;

use sa_protocol::{MatchKind, RouteResult};
use serde_json::{Map, Value};

use crate::confidence::ConfidenceScorer;
use crate::error::{RouterError, RouterResult};
use crate::extractor::ParameterExtractor;
use crate::policy::Policy;
use crate::rerank::{self, Reranker};
use crate::store::{StubIndex, StubStore};
use crate::stubs::{Stub, leading_resource};
use crate::vocab::{ActionClass, IMPORTANT_KEYWORDS, tokenize};

const PATTERN_CEILING: f64 = 0.95;
const KEYWORD_CEILING: f64 = 0.90;
const ACTION_CONFIDENCE: f64 = 0.85;

/// One matcher's proposal.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub stub: Arc<Stub>,
    pub kind: MatchKind,
    pub confidence: f64,
    pub reasoning: String,
    /// Compile order of the stub, last tie-breaker.
    pub order: usize,
}

/// Text-to-stub router.
#[derive(Debug, Clone)]
pub struct RulesEngine {
    store: Arc<StubStore>,
    policy: Arc<Policy>,
    extractor: ParameterExtractor,
    scorer: ConfidenceScorer,
    reranker: Option<Arc<dyn Reranker>>,
}

impl RulesEngine {
    /// Engine over `store`, with the reranker named by the policy.
    pub fn new(store: Arc<StubStore>, policy: Arc<Policy>) -> Self {
        let reranker = rerank::from_backend(policy.reranker);
        Self {
            store,
            policy,
            extractor: ParameterExtractor::new(),
            scorer: ConfidenceScorer::new(),
            reranker,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_scorer(mut self, scorer: ConfidenceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<StubStore> {
        &self.store
    }

    /// Route `text` to a stub and classify the outcome.
    pub fn route(&self, text: &str) -> RouterResult<RouteResult> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RouterError::EmptyInput);
        }

        let Some(best) = self.candidates(text).into_iter().next() else {
            tracing::debug!(text, "no routing candidates");
            return Ok(RouteResult::unmatched("no stub matched the input"));
        };

        let schema = best.stub.input_schema.as_ref();
        let mut args = self.extractor.extract(text, schema);
        let scored = self.scorer.score(text, &best.stub, &args, Some(best.kind));
        self.bind_path_params(text, &best.stub, &mut args);
        let confidence = ((best.confidence + scored) / 2.0).clamp(0.0, 1.0);
        let decision = self.policy.decide(confidence);

        tracing::debug!(
            endpoint = %best.stub.name,
            kind = ?best.kind,
            raw = best.confidence,
            scored,
            confidence,
            decision = ?decision,
            "routed"
        );

        Ok(RouteResult {
            endpoint: best.stub.name.clone(),
            method: Some(best.stub.method),
            path: best.stub.path.clone(),
            args,
            confidence,
            decision,
            reasoning: best.reasoning,
            match_kind: Some(best.kind),
        })
    }

    /// Fill `{param}` path segments the extractor left unset. A literal bound
    /// to a path parameter is dropped from any undeclared argument that also
    /// captured it.
    fn bind_path_params(&self, text: &str, stub: &Stub, args: &mut Map<String, Value>) {
        let declared = |key: &str| {
            stub.input_schema
                .as_ref()
                .is_some_and(|schema| schema.properties.contains_key(key))
        };
        let mut taken = Vec::new();
        for name in stub.path_params() {
            if let Some(value) = args.get(name) {
                taken.push(literal(value));
                continue;
            }
            let Some(value) = self.extractor.extract_path_param(text, name, &taken) else {
                continue;
            };
            let bound = literal(&value);
            args.retain(|key, existing| declared(key.as_str()) || literal(existing) != bound);
            args.insert(name.to_string(), value);
            taken.push(bound);
        }
    }

    /// Every matcher proposal for `text`, best first.
    pub fn candidates(&self, text: &str) -> Vec<Candidate> {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return Vec::new();
        }
        let index = self.store.snapshot();

        let mut candidates = pattern_candidates(&index, &lower);
        candidates.extend(keyword_candidates(&index, &lower));
        candidates.extend(action_candidates(&index, &lower));

        if let Some(reranker) = &self.reranker {
            for candidate in &mut candidates {
                candidate.confidence = reranker.score(&lower, &candidate.stub).clamp(0.0, 1.0);
            }
        }

        rank(&mut candidates);
        tracing::debug!(count = candidates.len(), generation = index.generation(), "candidates");
        candidates
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Confidence descending, then matcher priority, then compile order.
fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| b.kind.priority().cmp(&a.kind.priority()))
            .then_with(|| a.order.cmp(&b.order))
    });
}

fn pattern_candidates(index: &StubIndex, lower: &str) -> Vec<Candidate> {
    index
        .find_by_pattern(lower)
        .into_iter()
        .map(|hit| Candidate {
            confidence: (0.7 + hit.span_ratio * 0.25).min(PATTERN_CEILING),
            reasoning: format!(
                "pattern '{}' covered {:.0}% of the input",
                hit.pattern,
                hit.span_ratio * 100.0
            ),
            kind: MatchKind::Pattern,
            order: hit.order,
            stub: hit.stub,
        })
        .collect()
}

fn keyword_candidates(index: &StubIndex, lower: &str) -> Vec<Candidate> {
    index
        .find_by_keywords(lower)
        .into_iter()
        .filter(|hit| !hit.matched.is_empty() && !hit.stub.keywords.is_empty())
        .map(|hit| {
            let overlap = hit.matched.len() as f64 / hit.stub.keywords.len() as f64;
            let important = hit
                .matched
                .iter()
                .filter(|k| IMPORTANT_KEYWORDS.contains(&k.as_str()))
                .count() as f64
                / hit.matched.len() as f64;
            Candidate {
                confidence: (overlap * 0.6 + important * 0.4).min(KEYWORD_CEILING),
                reasoning: format!("keywords matched: {}", hit.matched.join(", ")),
                kind: MatchKind::Keyword,
                order: hit.order,
                stub: hit.stub,
            }
        })
        .collect()
}

fn action_candidates(index: &StubIndex, lower: &str) -> Vec<Candidate> {
    let tokens = tokenize(lower);
    let Some((class, verb)) = ActionClass::ALL.into_iter().find_map(|class| {
        tokens
            .iter()
            .find(|t| class.verbs().contains(&t.as_str()))
            .map(|verb| (class, verb.clone()))
    }) else {
        return Vec::new();
    };

    index
        .list_all()
        .into_iter()
        .enumerate()
        .filter(|(_, stub)| class.methods().contains(&stub.method))
        .filter_map(|(order, stub)| {
            let resource = leading_resource(&stub.path)?;
            if !lower.contains(&resource) {
                return None;
            }
            Some(Candidate {
                confidence: ACTION_CONFIDENCE,
                reasoning: format!("action '{verb}' on resource '{resource}'"),
                kind: MatchKind::Action,
                order,
                stub,
            })
        })
        .collect()
}

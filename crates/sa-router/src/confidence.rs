//! Confidence scoring for a routed stub.
//!
//! Five factors are blended with fixed weights, then a few multiplicative
//! adjustments are applied. The result is always clamped to `[0, 1]`.

use std::collections::HashSet;

use sa_protocol::{HttpMethod, MatchKind, Schema, SchemaType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::patterns;
use crate::stubs::Stub;
use crate::vocab::tokenize;

/// Verbs that boost keyword overlap when present in both text and stub.
const BOOST_VERBS: &[&str] = &["create", "delete", "update", "get", "list"];

/// Relative weight of each scoring factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub pattern: f64,
    pub keyword: f64,
    pub action: f64,
    pub completeness: f64,
    pub schema: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            pattern: 0.35,
            keyword: 0.25,
            action: 0.20,
            completeness: 0.15,
            schema: 0.05,
        }
    }
}

impl ScoreWeights {
    fn total(&self) -> f64 {
        self.pattern + self.keyword + self.action + self.completeness + self.schema
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    weights: ScoreWeights,
}

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    /// Score how well `stub` fits `text` given the extracted `args`.
    pub fn score(
        &self,
        text: &str,
        stub: &Stub,
        args: &Map<String, Value>,
        kind: Option<MatchKind>,
    ) -> f64 {
        let lower = text.to_lowercase();
        let w = &self.weights;

        let blended = w.pattern * pattern_factor(&lower, stub, kind)
            + w.keyword * keyword_factor(&lower, stub)
            + w.action * action_factor(&lower, stub.method)
            + w.completeness * completeness_factor(args, stub.input_schema.as_ref())
            + w.schema * schema_factor(args, stub.input_schema.as_ref());
        let total = w.total();
        let base = if total > 0.0 { blended / total } else { 0.5 };

        adjust(base, &lower, stub, args).clamp(0.0, 1.0)
    }
}

fn pattern_factor(lower: &str, stub: &Stub, kind: Option<MatchKind>) -> f64 {
    match kind {
        Some(MatchKind::Pattern) => 0.95,
        Some(MatchKind::Keyword) => 0.75,
        Some(MatchKind::Action) => 0.70,
        None => {
            let hit = lower
                .split_whitespace()
                .any(|word| stub.patterns.iter().any(|p| p.contains(word)));
            if hit { 0.60 } else { 0.30 }
        }
    }
}

/// Jaccard similarity of whitespace tokens and stub keywords.
fn keyword_factor(lower: &str, stub: &Stub) -> f64 {
    if stub.keywords.is_empty() {
        return 0.5;
    }
    let words: HashSet<&str> = lower.split_whitespace().collect();
    let keywords: HashSet<&str> = stub.keywords.iter().map(String::as_str).collect();

    let common: HashSet<&str> = words.intersection(&keywords).copied().collect();
    let union = words.union(&keywords).count();
    if union == 0 {
        return 0.0;
    }
    let jaccard = common.len() as f64 / union as f64;
    if common.iter().any(|w| BOOST_VERBS.contains(w)) {
        (jaccard * 1.2).min(1.0)
    } else {
        jaccard
    }
}

fn method_verbs(method: HttpMethod) -> &'static [&'static str] {
    match method {
        HttpMethod::Post => &["create", "add", "new", "make", "build", "post"],
        HttpMethod::Get => &["get", "list", "show", "fetch", "retrieve", "find", "view"],
        HttpMethod::Put => &["update", "edit", "modify", "change", "replace"],
        HttpMethod::Patch => &["update", "edit", "modify", "patch"],
        HttpMethod::Delete => &["delete", "remove", "destroy", "clear"],
    }
}

fn action_factor(lower: &str, method: HttpMethod) -> f64 {
    let verbs = method_verbs(method);
    if verbs.iter().any(|verb| lower.contains(verb)) {
        return 0.90;
    }
    let partial = verbs.iter().any(|verb| {
        let stem: String = verb.chars().take(3).collect();
        lower.split_whitespace().any(|word| word.starts_with(&stem))
    });
    if partial { 0.60 } else { 0.30 }
}

/// `required_ratio * 0.8 + optional_ratio * 0.2`; 1.0 with nothing to fill.
fn completeness_factor(args: &Map<String, Value>, schema: Option<&Schema>) -> f64 {
    let Some(schema) = schema.filter(|s| !s.properties.is_empty()) else {
        return 1.0;
    };
    let (required, optional): (Vec<&String>, Vec<&String>) = schema
        .properties
        .keys()
        .partition(|name| schema.is_required(name));

    let ratio = |names: &[&String]| {
        if names.is_empty() {
            1.0
        } else {
            let present = names.iter().filter(|&&n| args.contains_key(n)).count();
            present as f64 / names.len() as f64
        }
    };
    ratio(required.as_slice()) * 0.8 + ratio(optional.as_slice()) * 0.2
}

/// Share of extracted args that satisfy their declared constraints.
fn schema_factor(args: &Map<String, Value>, schema: Option<&Schema>) -> f64 {
    let Some(schema) = schema else {
        return 0.5;
    };
    if args.is_empty() {
        return 0.5;
    }
    let valid = args
        .iter()
        .filter(|(name, value)| {
            schema
                .properties
                .get(name.as_str())
                .is_some_and(|property| satisfies(value, property))
        })
        .count();
    valid as f64 / args.len() as f64
}

/// Whether `value` fits the property's type, enum, pattern, and range.
pub fn satisfies(value: &Value, property: &Schema) -> bool {
    let type_ok = match property.kind {
        Some(SchemaType::String) => value.as_str().is_some_and(|s| {
            property.pattern.as_deref().is_none_or(|pattern| {
                patterns::compiled(pattern)
                    .and_then(|re| re.find(s).map(|m| m.start()))
                    .is_some_and(|start| start == 0)
            })
        }),
        Some(SchemaType::Integer) => value.is_i64() || value.is_u64(),
        Some(SchemaType::Number) => value.is_number(),
        Some(SchemaType::Boolean) => value.is_boolean(),
        Some(SchemaType::Array) => value.is_array(),
        Some(SchemaType::Object) => value.is_object(),
        _ => true,
    };
    if !type_ok {
        return false;
    }
    if !property.enum_values.is_empty() && !property.enum_values.contains(value) {
        return false;
    }
    if let Some(n) = value.as_f64() {
        if property.minimum.is_some_and(|min| n < min) {
            return false;
        }
        if property.maximum.is_some_and(|max| n > max) {
            return false;
        }
    }
    true
}

fn adjust(mut score: f64, lower: &str, stub: &Stub, args: &Map<String, Value>) -> f64 {
    let word_count = lower.split_whitespace().count();
    if word_count <= 3 {
        score = (score * 1.1).min(1.0);
    }
    if word_count > 20 {
        score *= 0.95;
    }

    if let Some(schema) = &stub.input_schema
        && !schema.required.is_empty()
        && schema.required.iter().all(|r| args.contains_key(r))
    {
        score = (score * 1.05).min(1.0);
    }

    let opposing: &[&str] = match stub.method {
        HttpMethod::Delete => &["create", "add", "new"],
        HttpMethod::Post => &["delete", "remove", "destroy"],
        _ => &[],
    };
    let contradicts = tokenize(lower)
        .iter()
        .any(|t| opposing.contains(&t.as_str()));
    if contradicts {
        score *= 0.7;
    }
    score
}

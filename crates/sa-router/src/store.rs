//! Indexed, atomically swappable repository of compiled stubs.
//!
//! Readers take an `Arc` snapshot of the current [`StubIndex`]; a rebuild
//! compiles a complete new index off-lock and swaps the pointer, so no
//! reader ever sees a mix of two generations.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use regex::Regex;
use sa_protocol::{Descriptor, HttpMethod};

use crate::error::{RouterError, RouterResult};
use crate::stubs::{Stub, build_pattern, compile_descriptor};
use crate::vocab::tokenize;

/// A compiled stub pattern and the stub it belongs to.
#[derive(Debug)]
struct CompiledPattern {
    regex: Regex,
    source: String,
    stub: usize,
}

/// A stub whose pattern matched, with the share of the text it covered.
#[derive(Debug, Clone)]
pub struct PatternHit {
    pub stub: Arc<Stub>,
    pub pattern: String,
    /// Matched span length over text length, in `[0, 1]`.
    pub span_ratio: f64,
    /// Position of the stub in compile order.
    pub order: usize,
}

/// A stub sharing keywords with the text.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub stub: Arc<Stub>,
    /// Stub keywords present in the text, in stub keyword order.
    pub matched: Vec<String>,
    pub order: usize,
}

/// One immutable generation of stubs and their indices.
#[derive(Debug, Default)]
pub struct StubIndex {
    generation: u64,
    stubs: Vec<Arc<Stub>>,
    by_name: HashMap<String, usize>,
    by_endpoint: HashMap<(HttpMethod, String), usize>,
    /// keyword → stub positions, ascending.
    keywords: HashMap<String, Vec<usize>>,
    patterns: Vec<CompiledPattern>,
}

impl StubIndex {
    fn build(stubs: Vec<Stub>) -> RouterResult<Self> {
        let mut index = Self::default();

        for (position, stub) in stubs.into_iter().enumerate() {
            let duplicate = |reason: String| RouterError::StubCompilation {
                method: stub.method.to_string(),
                path: stub.path.clone(),
                reason,
            };
            if index.by_name.contains_key(&stub.name) {
                return Err(duplicate(format!("duplicate stub name '{}'", stub.name)));
            }
            if index
                .by_endpoint
                .contains_key(&(stub.method, stub.path.clone()))
            {
                return Err(duplicate("duplicate endpoint".into()));
            }

            for source in &stub.patterns {
                let regex = build_pattern(source)
                    .map_err(|e| duplicate(format!("invalid pattern '{source}': {e}")))?;
                index.patterns.push(CompiledPattern {
                    regex,
                    source: source.clone(),
                    stub: position,
                });
            }
            for keyword in &stub.keywords {
                let slots = index.keywords.entry(keyword.clone()).or_default();
                if slots.last() != Some(&position) {
                    slots.push(position);
                }
            }
            index.by_name.insert(stub.name.clone(), position);
            index
                .by_endpoint
                .insert((stub.method, stub.path.clone()), position);
            index.stubs.push(Arc::new(stub));
        }

        Ok(index)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, name: &str) -> Option<Arc<Stub>> {
        self.by_name.get(name).map(|&i| self.stubs[i].clone())
    }

    pub fn get_by_endpoint(&self, method: HttpMethod, path: &str) -> Option<Arc<Stub>> {
        self.by_endpoint
            .get(&(method, path.to_string()))
            .map(|&i| self.stubs[i].clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }

    /// All stubs in compile order.
    pub fn list_all(&self) -> Vec<Arc<Stub>> {
        self.stubs.clone()
    }

    /// Stubs sharing at least one keyword with the text, most overlap first
    /// (ties keep compile order).
    pub fn find_by_keywords(&self, text: &str) -> Vec<KeywordHit> {
        let words: Vec<String> = tokenize(text);

        let mut positions: Vec<usize> = words
            .iter()
            .filter_map(|w| self.keywords.get(w))
            .flatten()
            .copied()
            .collect();
        positions.sort_unstable();
        positions.dedup();

        let mut hits: Vec<KeywordHit> = positions
            .into_iter()
            .map(|order| {
                let stub = self.stubs[order].clone();
                let matched = stub
                    .keywords
                    .iter()
                    .filter(|k| words.contains(k))
                    .cloned()
                    .collect();
                KeywordHit {
                    stub,
                    matched,
                    order,
                }
            })
            .collect();
        hits.sort_by(|a, b| {
            b.matched
                .len()
                .cmp(&a.matched.len())
                .then(a.order.cmp(&b.order))
        });
        hits
    }

    /// Stubs with a matching pattern, best coverage first. Only the first
    /// matching pattern of each stub counts.
    pub fn find_by_pattern(&self, text: &str) -> Vec<PatternHit> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<PatternHit> = Vec::new();
        for pattern in &self.patterns {
            if hits.last().is_some_and(|h| h.order == pattern.stub) {
                continue;
            }
            if let Some(m) = pattern.regex.find(text) {
                hits.push(PatternHit {
                    stub: self.stubs[pattern.stub].clone(),
                    pattern: pattern.source.clone(),
                    span_ratio: m.len() as f64 / text.len() as f64,
                    order: pattern.stub,
                });
            }
        }
        hits.sort_by(|a, b| {
            b.span_ratio
                .total_cmp(&a.span_ratio)
                .then(a.order.cmp(&b.order))
        });
        hits
    }
}

/// Thread-safe holder of the current [`StubIndex`].
#[derive(Debug, Default)]
pub struct StubStore {
    current: RwLock<Arc<StubIndex>>,
}

impl StubStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current generation. Holding the snapshot keeps it alive across
    /// a concurrent rebuild.
    pub fn snapshot(&self) -> Arc<StubIndex> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace every index with one built from `stubs`. Returns the new
    /// generation number. On error the previous generation stays in place.
    pub fn rebuild(&self, stubs: Vec<Stub>) -> RouterResult<u64> {
        let mut index = StubIndex::build(stubs)?;

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        index.generation = current.generation + 1;
        let generation = index.generation;
        let count = index.len();
        *current = Arc::new(index);
        drop(current);

        tracing::debug!(generation, stubs = count, "stub store rebuilt");
        Ok(generation)
    }

    /// Validate and compile a descriptor, then swap it in. Returns the
    /// number of stubs now loaded.
    pub fn compile_from_descriptor(&self, descriptor: &Descriptor) -> RouterResult<usize> {
        let stubs = compile_descriptor(descriptor)?;
        let count = stubs.len();
        self.rebuild(stubs)?;
        Ok(count)
    }

    pub fn clear(&self) -> u64 {
        // An empty stub list always builds.
        self.rebuild(Vec::new()).unwrap_or_default()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Stub>> {
        self.snapshot().get(name)
    }

    pub fn get_by_endpoint(&self, method: HttpMethod, path: &str) -> Option<Arc<Stub>> {
        self.snapshot().get_by_endpoint(method, path)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().contains(name)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn list_all(&self) -> Vec<Arc<Stub>> {
        self.snapshot().list_all()
    }

    pub fn find_by_keywords(&self, text: &str) -> Vec<KeywordHit> {
        self.snapshot().find_by_keywords(text)
    }

    pub fn find_by_pattern(&self, text: &str) -> Vec<PatternHit> {
        self.snapshot().find_by_pattern(text)
    }
}

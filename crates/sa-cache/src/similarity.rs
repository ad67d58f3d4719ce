//! L2: similarity cache over text embeddings.
//!
//! Without an [`Embedder`] the tier is inert: every lookup misses and every
//! store is a no-op.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::entry::{is_expired, remaining_ttl};
use crate::error::CacheResult;

/// Maximum entries kept before the oldest batch is dropped.
pub const SIMILARITY_CAPACITY: usize = 1000;
const DROP_BATCH: usize = 100;

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> CacheResult<Vec<f32>>;
}

#[derive(Debug, Clone)]
struct SimilarityEntry {
    text: String,
    embedding: Vec<f32>,
    value: Value,
    created_at: Instant,
    ttl: Option<Duration>,
}

/// A similarity match and the time it has left to live.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityHit {
    pub value: Value,
    pub remaining_ttl: Option<Duration>,
}

pub struct SimilarityCache {
    radius: f32,
    embedder: Option<Arc<dyn Embedder>>,
    entries: Mutex<VecDeque<SimilarityEntry>>,
}

impl std::fmt::Debug for SimilarityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityCache")
            .field("radius", &self.radius)
            .field("enabled", &self.enabled())
            .field("entries", &self.len())
            .finish()
    }
}

impl SimilarityCache {
    pub fn new(radius: f32, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            radius,
            embedder,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.embedder.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most similar live value at or above the radius. Expired entries are
    /// dropped first.
    pub async fn get(&self, text: &str) -> Option<SimilarityHit> {
        let Some(embedder) = &self.embedder else {
            tracing::debug!("similarity tier inert: no embedder");
            return None;
        };
        if self.is_empty() {
            return None;
        }
        let query = match embedder.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "similarity lookup skipped");
                return None;
            }
        };

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|e| !is_expired(e.created_at, e.ttl));
        let mut best: Option<(f32, &SimilarityEntry)> = None;
        for entry in entries.iter() {
            let score = cosine_similarity(&query, &entry.embedding);
            if score >= self.radius && best.is_none_or(|(s, _)| score > s) {
                best = Some((score, entry));
            }
        }
        best.map(|(score, entry)| {
            tracing::debug!(score, matched = %entry.text, "similarity hit");
            SimilarityHit {
                value: entry.value.clone(),
                remaining_ttl: remaining_ttl(entry.created_at, entry.ttl),
            }
        })
    }

    pub async fn set(&self, text: &str, value: Value, ttl: Option<Duration>) {
        let Some(embedder) = &self.embedder else {
            return;
        };
        let embedding = match embedder.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "similarity store skipped");
                return;
            }
        };

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|e| e.text != text);
        entries.push_back(SimilarityEntry {
            text: text.to_string(),
            embedding,
            value,
            created_at: Instant::now(),
            ttl,
        });
        if entries.len() > SIMILARITY_CAPACITY {
            entries.drain(..DROP_BATCH);
        }
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Cosine of the angle between two vectors; 0 for empty, zero, or
/// mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

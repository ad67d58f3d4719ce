//! Two-tier cache: exact-key L1, then similarity L2.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, CacheResult};
use crate::exact::{ExactCache, ExactStats};
use crate::similarity::{Embedder, SimilarityCache};

fn default_max_entries() -> usize {
    1000
}

fn default_max_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_radius() -> f32 {
    0.85
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default)]
    pub enable_semantic: bool,
    #[serde(default = "default_radius")]
    pub semantic_radius: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_bytes: default_max_bytes(),
            enable_semantic: false,
            semantic_radius: default_radius(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    l1_hits: AtomicU64,
    l1_misses: AtomicU64,
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
    total_requests: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        for c in [
            &self.l1_hits,
            &self.l1_misses,
            &self.l2_hits,
            &self.l2_misses,
            &self.total_requests,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

/// Serialisable cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub total_requests: u64,
    pub l1_hit_rate: f64,
    pub overall_hit_rate: f64,
    pub l1: ExactStats,
    pub l2_enabled: bool,
    pub l2_entries: usize,
}

/// The result cache used by the client.
///
/// L2 only exists when `enable_semantic` is set, and stays inert until an
/// [`Embedder`] is attached.
#[derive(Debug)]
pub struct TieredCache {
    l1: Mutex<ExactCache>,
    l2: Option<SimilarityCache>,
    counters: Counters,
}

impl TieredCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_embedder(config: &CacheConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self::build(config, Some(embedder))
    }

    fn build(config: &CacheConfig, embedder: Option<Arc<dyn Embedder>>) -> Self {
        let l2 = config
            .enable_semantic
            .then(|| SimilarityCache::new(config.semantic_radius, embedder));
        Self {
            l1: Mutex::new(ExactCache::new(config.max_entries, config.max_bytes)),
            l2,
            counters: Counters::default(),
        }
    }

    fn l1(&self) -> MutexGuard<'_, ExactCache> {
        self.l1.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// L1 by key, then L2 by `semantic` text. An L2 hit is promoted to L1
    /// for the rest of its lifetime.
    pub async fn get(&self, key: &str, semantic: Option<&str>) -> Option<Value> {
        Counters::bump(&self.counters.total_requests);

        let hit = self.l1().get(key);
        if let Some(value) = hit {
            Counters::bump(&self.counters.l1_hits);
            return Some(value);
        }
        Counters::bump(&self.counters.l1_misses);

        let (Some(l2), Some(text)) = (&self.l2, semantic) else {
            return None;
        };
        match l2.get(text).await {
            Some(hit) => {
                Counters::bump(&self.counters.l2_hits);
                self.l1().set(key, hit.value.clone(), hit.remaining_ttl);
                Some(hit.value)
            }
            None => {
                Counters::bump(&self.counters.l2_misses);
                None
            }
        }
    }

    pub async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        semantic: Option<&str>,
    ) {
        if let (Some(l2), Some(text)) = (&self.l2, semantic) {
            l2.set(text, value.clone(), ttl).await;
        }
        self.l1().set(key, value, ttl);
    }

    /// Cached value for `key`, or the result of `compute` stored in both
    /// tiers.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        semantic: Option<&str>,
        compute: F,
    ) -> CacheResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
        E: std::fmt::Display,
    {
        if let Some(value) = self.get(key, semantic).await {
            return Ok(value);
        }
        let value = compute()
            .await
            .map_err(|e| CacheError::Compute(e.to_string()))?;
        self.set(key, value.clone(), ttl, semantic).await;
        Ok(value)
    }

    /// Drop one L1 entry; true if it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.l1().remove(key)
    }

    /// Empty both tiers and reset counters.
    pub fn clear(&self) {
        self.l1().clear();
        if let Some(l2) = &self.l2 {
            l2.clear();
        }
        self.counters.reset();
    }

    pub fn stats(&self) -> CacheStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let l1_hits = load(&self.counters.l1_hits);
        let l2_hits = load(&self.counters.l2_hits);
        let total_requests = load(&self.counters.total_requests);
        let rate = |hits: u64| {
            if total_requests == 0 {
                0.0
            } else {
                hits as f64 / total_requests as f64
            }
        };
        CacheStats {
            l1_hits,
            l1_misses: load(&self.counters.l1_misses),
            l2_hits,
            l2_misses: load(&self.counters.l2_misses),
            total_requests,
            l1_hit_rate: rate(l1_hits),
            overall_hit_rate: rate(l1_hits + l2_hits),
            l1: self.l1().stats(),
            l2_enabled: self.l2.as_ref().is_some_and(SimilarityCache::enabled),
            l2_entries: self.l2.as_ref().map_or(0, SimilarityCache::len),
        }
    }
}

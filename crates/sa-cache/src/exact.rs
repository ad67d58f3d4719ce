//! L1: exact-key LRU with TTL and byte-size accounting.

use std::time::Duration;

use lru::LruCache;
use serde::Serialize;
use serde_json::Value;

use crate::entry::CacheEntry;

/// Snapshot of the L1 tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExactStats {
    pub entries: usize,
    pub size_bytes: usize,
    pub size_mb: f64,
    pub total_hits: u64,
    pub max_entries: usize,
    pub max_size_mb: f64,
}

/// Least-recently-used map bounded by entry count and encoded size.
///
/// Not synchronised; [`TieredCache`](crate::TieredCache) wraps it in a mutex.
#[derive(Debug)]
pub struct ExactCache {
    entries: LruCache<String, CacheEntry>,
    max_entries: usize,
    max_bytes: usize,
    total_bytes: usize,
}

impl ExactCache {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            max_entries,
            max_bytes,
            total_bytes: 0,
        }
    }

    /// Fetch and promote a live entry. Expired entries are dropped.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let expired = self.entries.peek(key)?.is_expired();
        if expired {
            self.remove(key);
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        entry.hit_count += 1;
        Some(entry.value.clone())
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let entry = CacheEntry::new(key, value, ttl);
        self.remove(&entry.key);

        while !self.entries.is_empty()
            && (self.entries.len() >= self.max_entries
                || self.total_bytes + entry.size_bytes > self.max_bytes)
        {
            if let Some((evicted, old)) = self.entries.pop_lru() {
                self.total_bytes = self.total_bytes.saturating_sub(old.size_bytes);
                tracing::debug!(key = %evicted, "evicted cache entry");
            }
        }

        self.total_bytes += entry.size_bytes;
        self.entries.put(entry.key.clone(), entry);
    }

    /// Drop `key`; true if it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(old) => {
                self.total_bytes = self.total_bytes.saturating_sub(old.size_bytes);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn stats(&self) -> ExactStats {
        const MB: f64 = 1024.0 * 1024.0;
        ExactStats {
            entries: self.entries.len(),
            size_bytes: self.total_bytes,
            size_mb: self.total_bytes as f64 / MB,
            total_hits: self.entries.iter().map(|(_, e)| e.hit_count).sum(),
            max_entries: self.max_entries,
            max_size_mb: self.max_bytes as f64 / MB,
        }
    }
}

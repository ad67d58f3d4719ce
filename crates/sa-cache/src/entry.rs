use std::time::{Duration, Instant};

use serde_json::Value;
use sha2::{Digest, Sha256};

/// One cached call result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub created_at: Instant,
    pub ttl: Option<Duration>,
    pub hit_count: u64,
    /// Encoded JSON length, used for byte-size accounting.
    pub size_bytes: usize,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: Value, ttl: Option<Duration>) -> Self {
        let size_bytes = estimate_size(&value);
        Self {
            key: key.into(),
            value,
            created_at: Instant::now(),
            ttl,
            hit_count: 0,
            size_bytes,
        }
    }

    pub fn is_expired(&self) -> bool {
        is_expired(self.created_at, self.ttl)
    }
}

pub(crate) fn is_expired(created_at: Instant, ttl: Option<Duration>) -> bool {
    ttl.is_some_and(|ttl| created_at.elapsed() > ttl)
}

/// Time left before an entry created at `created_at` expires; `None` means
/// it never does.
pub(crate) fn remaining_ttl(created_at: Instant, ttl: Option<Duration>) -> Option<Duration> {
    ttl.map(|ttl| ttl.saturating_sub(created_at.elapsed()))
}

fn estimate_size(value: &Value) -> usize {
    serde_json::to_vec(value)
        .map(|v| v.len())
        .unwrap_or_default()
}

/// Deterministic key for a stub call: SHA-256 hex of
/// `name:version:<args as sorted JSON>`.
pub fn cache_key(name: &str, version: &str, args: &serde_json::Map<String, Value>) -> String {
    let normalized = canonical_json(&Value::Object(args.clone()));
    let mut hasher = Sha256::new();
    hasher.update(format!("{name}:{version}:{normalized}").as_bytes());
    format!("{:x}", hasher.finalize())
}

/// JSON text with object keys sorted at every depth.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn key_ignores_argument_order() {
        let a = args(json!({"a": 1, "b": {"y": 2, "x": 1}}));
        let b = args(json!({"b": {"x": 1, "y": 2}, "a": 1}));
        let a = cache_key("list_todos", "1", &a);
        let b = cache_key("list_todos", "1", &b);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn key_depends_on_name_version_and_args() {
        let base = cache_key("list_todos", "1", &args(json!({"a": 1})));
        assert_ne!(base, cache_key("list_users", "1", &args(json!({"a": 1}))));
        assert_ne!(base, cache_key("list_todos", "2", &args(json!({"a": 1}))));
        assert_ne!(base, cache_key("list_todos", "1", &args(json!({"a": 2}))));
    }

    #[test]
    fn canonical_json_sorts_nested_keys() {
        assert_eq!(
            canonical_json(&json!({"b": [{"d": 1, "c": "x"}], "a": null})),
            r#"{"a":null,"b":[{"c":"x","d":1}]}"#
        );
    }

    #[test]
    fn entry_expiry() {
        let forever = CacheEntry::new("k", json!(1), None);
        assert!(!forever.is_expired());
        let mut short = CacheEntry::new("k", json!(1), Some(Duration::from_millis(5)));
        short.created_at -= Duration::from_millis(10);
        assert!(short.is_expired());
    }

    #[test]
    fn entry_size_is_encoded_length() {
        assert_eq!(CacheEntry::new("k", json!({"a": 1}), None).size_bytes, 7);
    }
}

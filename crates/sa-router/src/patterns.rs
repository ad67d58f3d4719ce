//! Compiled regexes for patterns only known at runtime: schema property
//! patterns and per-property mention patterns.
//!
//! Routing hits the same handful of patterns on every request, so each one
//! is built once and kept in a bounded LRU. Invalid patterns are remembered
//! too, as `None`.

use std::num::NonZeroUsize;
use std::sync::{LazyLock, Mutex, PoisonError};

use lru::LruCache;
use regex::{Regex, RegexBuilder};

const CAPACITY: NonZeroUsize = NonZeroUsize::new(512).unwrap();

static COMPILED: LazyLock<Mutex<LruCache<String, Option<Regex>>>> =
    LazyLock::new(|| Mutex::new(LruCache::new(CAPACITY)));

/// Case-sensitive regex for `pattern`.
pub fn compiled(pattern: &str) -> Option<Regex> {
    lookup(pattern, false)
}

/// Case-insensitive regex for `pattern`.
pub fn compiled_ignore_case(pattern: &str) -> Option<Regex> {
    lookup(pattern, true)
}

fn lookup(pattern: &str, ignore_case: bool) -> Option<Regex> {
    let key = format!("{}{pattern}", if ignore_case { "i:" } else { "s:" });
    let mut cache = COMPILED.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(regex) = cache.get(&key) {
        return regex.clone();
    }
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .build()
        .ok();
    cache.put(key, regex.clone());
    regex
}

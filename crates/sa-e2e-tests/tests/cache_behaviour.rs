//! E2E tests for the response cache as seen through the client.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use helpers::{TodoService, client_with, started_client, todo_descriptor};
use sa_cache::{CacheResult, Embedder};
use sa_protocol::{DescriptorBuilder, EndpointRegistration, HttpMethod};
use sa_router::Policy;

/// Second identical request is served from L1 without touching the service.
#[tokio::test]
async fn e2e_repeat_call_hits_cache() {
    let service = TodoService::start().await;
    let client = started_client(&service);

    let first = client.call("list all todos").await.unwrap();
    let second = client.call("list all todos").await.unwrap();
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(second.rendered_text.as_deref(), Some("Empty list"));
    assert_eq!(service.hits("/todos").await, 1);

    let stats = client.cache_stats();
    assert_eq!(stats.l1_hits, 1);
    assert_eq!(stats.l1_misses, 1);
    assert_eq!(stats.l1.entries, 1);
    assert!(client.telemetry().summary().cache_hit_rate > 0.0);
}

/// A descriptor cache hint expires the entry after its TTL.
#[tokio::test]
async fn e2e_cache_hint_expires() {
    let service = TodoService::start().await;
    let descriptor = DescriptorBuilder::new("Todo API", service.server.uri())
        .register(EndpointRegistration::new(
            HttpMethod::Get,
            "/todos",
            "List all todos",
        ))
        .cache_hint("/todos", 1)
        .build()
        .unwrap();
    let client = client_with(Policy::default()).build().unwrap();
    client.start(descriptor).unwrap();

    client.call("list all todos").await.unwrap();
    assert!(client.call("list all todos").await.unwrap().cache_hit);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let after = client.call("list all todos").await.unwrap();
    assert!(!after.cache_hit);
    assert_eq!(service.hits("/todos").await, 2);
}

/// Different arguments produce different cache keys.
#[tokio::test]
async fn e2e_args_are_part_of_the_key() {
    let service = TodoService::start().await;
    let client = started_client(&service);

    client.call(r#"create a todo "buy milk""#).await.unwrap();
    client.call(r#"create a todo "walk dog""#).await.unwrap();
    assert_eq!(service.state.len(), 2);
    assert_eq!(client.cache_stats().l1.entries, 2);
}

/// A cache bounded at two entries evicts the least recently used one.
#[tokio::test]
async fn e2e_cache_evicts_lru() {
    let service = TodoService::start().await;
    let client = client_with(Policy {
        max_cache_entries: 2,
        ..Policy::default()
    })
    .build()
    .unwrap();
    client.start(service.descriptor()).unwrap();

    for item in ["buy milk", "walk dog", "water plants"] {
        let text = format!(r#"create a todo "{item}""#);
        assert!(client.call(text.as_str()).await.unwrap().success);
    }
    assert_eq!(client.cache_stats().l1.entries, 2);

    // The oldest create fell out, so repeating it reaches the service again.
    let again = client.call(r#"create a todo "buy milk""#).await.unwrap();
    assert!(!again.cache_hit);
    assert_eq!(service.state.len(), 4);
}

/// Clearing the cache forces the next call back to the service.
#[tokio::test]
async fn e2e_clear_cache() {
    let service = TodoService::start().await;
    let client = started_client(&service);

    client.call("list all todos").await.unwrap();
    client.clear_cache();
    assert!(!client.call("list all todos").await.unwrap().cache_hit);
    assert_eq!(service.hits("/todos").await, 2);
}

/// Maps text onto a small bag-of-letters vector.
struct LetterEmbedder;

#[async_trait]
impl Embedder for LetterEmbedder {
    async fn embed(&self, text: &str) -> CacheResult<Vec<f32>> {
        let mut v = vec![0.0f32; 26];
        for c in text.to_lowercase().bytes().filter(u8::is_ascii_lowercase) {
            v[usize::from(c - b'a')] += 1.0;
        }
        Ok(v)
    }
}

/// With an embedder and semantic caching on, the similarity tier is live.
#[tokio::test]
async fn e2e_semantic_tier_enabled_with_embedder() {
    let service = TodoService::start().await;
    let client = client_with(Policy {
        enable_semantic_cache: true,
        ..Policy::default()
    })
    .embedder(Arc::new(LetterEmbedder))
    .build()
    .unwrap();
    client
        .start(todo_descriptor(&service.server.uri()))
        .unwrap();

    client.call("list all todos").await.unwrap();
    let stats = client.cache_stats();
    assert!(stats.l2_enabled);
    assert_eq!(stats.l2_entries, 1);
}

//! E2E tests for text routing across router, executor, and telemetry.

mod helpers;

use std::sync::Arc;

use serde_json::json;

use helpers::{CountingInterpreter, TodoService, client_with, started_client};
use sa_client::{EventFilter, LLM_FALLBACK, Request};
use sa_protocol::{Decision, MatchKind, Via};
use sa_router::{Policy, PolicyPreset};

/// Free text creates a todo and the service sees the extracted body.
#[tokio::test]
async fn e2e_create_todo_from_text() {
    let service = TodoService::start().await;
    let client = started_client(&service);

    let route = client.route(r#"create a todo "buy milk""#).unwrap();
    assert_eq!(route.endpoint, "post_todo");
    assert_eq!(route.args.get("text"), Some(&json!("buy milk")));
    assert!(route.confidence >= 0.70, "confidence {}", route.confidence);
    assert!(matches!(
        route.decision,
        Decision::Direct | Decision::Confirm
    ));

    let result = client.call(r#"create a todo "buy milk""#).await.unwrap();
    assert!(result.success);
    assert_eq!(result.status_code, 201);
    assert_eq!(
        result.rendered_text.as_deref(),
        Some("Created todo #1: buy milk")
    );
    assert_eq!(service.state.len(), 1);
}

/// Created todos show up in a later list call.
#[tokio::test]
async fn e2e_create_then_list() {
    let service = TodoService::start().await;
    let client = started_client(&service);

    for item in ["buy milk", "walk dog"] {
        let text = format!(r#"create a todo "{item}""#);
        assert!(client.call(text.as_str()).await.unwrap().success);
    }

    let route = client.route("list all todos").unwrap();
    assert_eq!(route.match_kind, Some(MatchKind::Pattern));
    assert_eq!(route.decision, Decision::Direct);

    let listed = client.call("list all todos").await.unwrap();
    assert_eq!(listed.rendered_text.as_deref(), Some("2 items"));
    let items = listed.result.unwrap();
    assert_eq!(items[1]["text"], "walk dog");
}

/// A confirm-band decision still executes but counts as interpreter-assisted.
#[tokio::test]
async fn e2e_confirm_band_counts_as_llm() {
    let service = TodoService::start().await;
    let policy = Policy {
        short_circuit_threshold: 1.0,
        confirm_threshold: 0.5,
        ..Policy::default()
    };
    let client = client_with(policy).build().unwrap();
    client.start(service.descriptor()).unwrap();

    let route = client.route("list all todos").unwrap();
    assert_eq!(route.decision, Decision::Confirm);

    let result = client.call("list all todos").await.unwrap();
    assert!(result.success);
    let events = client.telemetry().events(&EventFilter::default());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].endpoint, "list_todos");
    assert_eq!(events[0].via, Via::Llm);
    assert_eq!(service.hits("/todos").await, 1);
}

/// Unroutable text never touches the service and goes to the interpreter.
#[tokio::test]
async fn e2e_fallback_to_interpreter() {
    let service = TodoService::start().await;
    let interpreter = Arc::new(CountingInterpreter::default());
    let client = client_with(Policy::default())
        .interpreter(interpreter.clone())
        .build()
        .unwrap();
    client.start(service.descriptor()).unwrap();

    let result = client
        .call("what's the weather like tomorrow")
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.tokens_used, CountingInterpreter::TOKENS);
    assert_eq!(interpreter.count(), 1);
    assert!(service.server.received_requests().await.unwrap().is_empty());

    let fallback = client
        .telemetry()
        .events(&EventFilter::default().endpoint(LLM_FALLBACK));
    assert_eq!(fallback.len(), 1);
    assert_eq!(fallback[0].confidence, Some(0.0));
    let tokens = client.telemetry().summary().tokens_used;
    assert_eq!(tokens, CountingInterpreter::TOKENS);
}

/// After D direct and L interpreted calls the short-circuit rate is D/(D+L).
#[tokio::test]
async fn e2e_short_circuit_rate() {
    let service = TodoService::start().await;
    let client = client_with(Policy::default())
        .interpreter(Arc::new(CountingInterpreter::default()))
        .build()
        .unwrap();
    client.start(service.descriptor()).unwrap();

    let (direct, llm) = (5u64, 3u64);
    for _ in 0..direct {
        client.call("list all todos").await.unwrap();
    }
    for _ in 0..llm {
        client.call("hello there").await.unwrap();
    }

    let summary = client.telemetry().summary();
    assert_eq!(summary.direct_calls, direct);
    assert_eq!(summary.llm_calls, llm);
    let rate = direct as f64 / (direct + llm) as f64;
    assert_eq!(summary.short_circuit_rate, rate);
    let per_call = sa_client::telemetry::TOKENS_SAVED_PER_DIRECT_CALL;
    assert_eq!(summary.tokens_saved, direct * per_call);
}

/// A conservative preset pushes borderline text to the interpreter.
#[tokio::test]
async fn e2e_conservative_preset_is_stricter() {
    let service = TodoService::start().await;
    let text = r#"create a todo "buy milk""#;

    let aggressive = client_with(Policy::preset(PolicyPreset::Aggressive))
        .build()
        .unwrap();
    aggressive.start(service.descriptor()).unwrap();
    let conservative = client_with(Policy::preset(PolicyPreset::Conservative))
        .build()
        .unwrap();
    conservative.start(service.descriptor()).unwrap();

    let loose = aggressive.route(text).unwrap();
    let strict = conservative.route(text).unwrap();
    assert_eq!(loose.confidence, strict.confidence);
    assert!(loose.decision >= strict.decision);
}

/// Explicit stub calls bypass routing and bind path parameters.
#[tokio::test]
async fn e2e_explicit_delete() {
    let service = TodoService::start().await;
    let client = started_client(&service);
    client.call(r#"create a todo "buy milk""#).await.unwrap();

    let args = json!({"id": 1}).as_object().unwrap().clone();
    let deleted = client
        .call(Request::stub("delete_todo_by_id", args))
        .await
        .unwrap();
    assert!(deleted.success);
    assert_eq!(deleted.rendered_text.as_deref(), Some("Status: deleted"));
    assert_eq!(service.state.len(), 0);
    assert_eq!(service.hits("/todo/1").await, 1);

    let missing = json!({"id": 99}).as_object().unwrap().clone();
    let r = client
        .call(Request::stub("delete_todo_by_id", missing))
        .await
        .unwrap();
    assert!(!r.success);
    assert_eq!(r.status_code, 404);
    assert_eq!(r.error.as_deref(), Some("todo not found"));
}

/// Free text fills `{id}` path segments and sends no stray query args.
#[tokio::test]
async fn e2e_delete_todo_from_text() {
    let service = TodoService::start().await;
    let client = started_client(&service);
    client.call(r#"create a todo "buy milk""#).await.unwrap();

    let route = client.route("delete todo 1").unwrap();
    assert_eq!(route.endpoint, "delete_todo_by_id");
    assert_eq!(route.args.get("id"), Some(&json!(1)));

    let deleted = client.call("delete todo 1").await.unwrap();
    assert!(deleted.success);
    assert_eq!(service.state.len(), 0);

    let missing = client.call("delete todo 42").await.unwrap();
    assert_eq!(missing.status_code, 404);
    assert_eq!(missing.error.as_deref(), Some("todo not found"));

    let requests = service.server.received_requests().await.unwrap();
    let deletes: Vec<_> = requests
        .iter()
        .filter(|r| r.method.as_str() == "DELETE")
        .map(|r| (r.url.path().to_string(), r.url.query().map(str::to_string)))
        .collect();
    assert_eq!(
        deletes,
        [("/todo/1".to_string(), None), ("/todo/42".to_string(), None)]
    );
}

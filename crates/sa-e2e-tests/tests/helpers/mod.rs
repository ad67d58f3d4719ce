//! Shared test harness for E2E integration tests.
//!
//! Runs a small in-memory todo service on a wiremock server and wires a
//! real [`Client`] against it, so every call crosses routing, caching,
//! HTTP execution, rendering, and telemetry.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use sa_client::{Client, ClientBuilder, ClientConfig, Interpreter};
use sa_executor::ExecutorConfig;
use sa_protocol::{
    ApiResult, Descriptor, DescriptorBuilder, EndpointRegistration, HttpMethod, Schema,
    SchemaType,
};
use sa_router::Policy;

/// Todo rows shared by the mock handlers.
#[derive(Default)]
pub struct TodoState {
    next_id: AtomicU64,
    todos: Mutex<Vec<Value>>,
}

impl TodoState {
    pub fn len(&self) -> usize {
        self.todos.lock().unwrap().len()
    }
}

struct CreateTodo(Arc<TodoState>);

impl Respond for CreateTodo {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponseTemplate::new(400).set_body_json(json!({"error": "invalid json"}));
        };
        let Some(text) = body.get("text").and_then(Value::as_str) else {
            return ResponseTemplate::new(422).set_body_json(json!({"error": "text is required"}));
        };
        let id = self.0.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let todo = json!({"id": id, "text": text, "done": false});
        self.0.todos.lock().unwrap().push(todo.clone());
        ResponseTemplate::new(201).set_body_json(todo)
    }
}

struct ListTodos(Arc<TodoState>);

impl Respond for ListTodos {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(Value::Array(self.0.todos.lock().unwrap().clone()))
    }
}

struct DeleteTodo(Arc<TodoState>);

impl Respond for DeleteTodo {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id: Option<u64> = request
            .url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|s| s.parse().ok());
        let mut todos = self.0.todos.lock().unwrap();
        let before = todos.len();
        todos.retain(|t| t["id"].as_u64() != id);
        if todos.len() == before {
            ResponseTemplate::new(404).set_body_json(json!({"error": "todo not found"}))
        } else {
            ResponseTemplate::new(200).set_body_json(json!({"status": "deleted"}))
        }
    }
}

/// A running todo service plus its descriptor.
pub struct TodoService {
    pub server: MockServer,
    pub state: Arc<TodoState>,
}

impl TodoService {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let state = Arc::new(TodoState::default());
        Mock::given(method("POST"))
            .and(path("/todo"))
            .respond_with(CreateTodo(state.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/todos"))
            .respond_with(ListTodos(state.clone()))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path_regex(r"^/todo/\d+$"))
            .respond_with(DeleteTodo(state.clone()))
            .mount(&server)
            .await;
        Self { server, state }
    }

    pub fn descriptor(&self) -> Descriptor {
        todo_descriptor(&self.server.uri())
    }

    /// Requests the mock server has seen for `path`.
    pub async fn hits(&self, path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == path)
            .count()
    }
}

pub fn todo_descriptor(base_url: &str) -> Descriptor {
    DescriptorBuilder::new("Todo API", base_url)
        .description("Minimal todo list")
        .register(
            EndpointRegistration::new(HttpMethod::Post, "/todo", "Create a new todo")
                .request(Schema::object(
                    [("text", Schema::of(SchemaType::String))],
                    &["text"],
                ))
                .example(r#"create a todo "buy milk""#),
        )
        .register(EndpointRegistration::new(
            HttpMethod::Get,
            "/todos",
            "List all todos",
        ))
        .register(EndpointRegistration::new(
            HttpMethod::Delete,
            "/todo/{id}",
            "Delete a todo",
        ))
        .response_template("/todo", "Created todo #{id}: {text}")
        .build()
        .unwrap()
}

/// Fast-failing executor settings for tests.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        executor: ExecutorConfig {
            timeout_ms: 2000,
            retry_delay_ms: 1,
            ..ExecutorConfig::default()
        },
        ..ClientConfig::default()
    }
}

pub fn client_with(policy: Policy) -> ClientBuilder {
    ClientBuilder::new(test_config()).policy(policy)
}

/// A started client against `service` with the default policy.
pub fn started_client(service: &TodoService) -> Client {
    let client = ClientBuilder::new(test_config()).build().unwrap();
    client.start(service.descriptor()).unwrap();
    client
}

/// Interpreter that answers every request and counts invocations.
#[derive(Default)]
pub struct CountingInterpreter {
    pub calls: AtomicUsize,
}

impl CountingInterpreter {
    pub const TOKENS: u64 = 750;

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Interpreter for CountingInterpreter {
    async fn interpret(
        &self,
        text: &str,
        _descriptor: Option<&Descriptor>,
    ) -> anyhow::Result<ApiResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ApiResult {
            success: true,
            status_code: 200,
            result: Some(json!({"answer": format!("interpreted: {text}")})),
            rendered_text: Some(format!("interpreted: {text}")),
            error: None,
            duration_ms: 40.0,
            tokens_used: Self::TOKENS,
            cache_hit: false,
        })
    }
}

//! Client orchestrator: route, look up the cache, execute, render, record.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sa_cache::{CacheStats, Embedder, TieredCache, cache_key};
use sa_executor::{BatchExecutor, CallRequest, Credentials, Executor};
use sa_protocol::{ApiResult, Decision, Descriptor, RouteResult, TelemetryEvent, Via};
use sa_router::{Policy, Reranker, RouterError, RulesEngine, Stub, StubStore};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{ClientConfig, cache_config};
use crate::error::{ClientError, ClientResult};
use crate::interpreter::Interpreter;
use crate::render::{PlainRenderer, Renderer};
use crate::telemetry::{Telemetry, TelemetrySummary};

/// Telemetry endpoint name for interpreter fallbacks.
pub const LLM_FALLBACK: &str = "llm_fallback";

/// What the caller wants done.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Free text, routed by the rules engine.
    Text(String),
    /// An explicit stub call; routing is bypassed.
    Stub {
        name: String,
        args: Map<String, Value>,
    },
}

impl Request {
    pub fn stub(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self::Stub {
            name: name.into(),
            args,
        }
    }
}

impl From<&str> for Request {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Request {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Serialisable snapshot of the compiled stubs.
#[derive(Debug, Clone, Serialize)]
pub struct StubExport {
    pub service: String,
    pub base_url: String,
    pub stubs: Vec<Stub>,
    pub telemetry: TelemetrySummary,
}

impl StubExport {
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> anyhow::Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Assembles a [`Client`] from config and optional collaborators.
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    interpreter: Option<Arc<dyn Interpreter>>,
    renderer: Option<Arc<dyn Renderer>>,
    embedder: Option<Arc<dyn Embedder>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    pub fn interpreter(mut self, interpreter: Arc<dyn Interpreter>) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Enables the similarity tier when the policy turns it on.
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Overrides the backend named by the policy.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn build(self) -> ClientResult<Client> {
        let ClientConfig {
            policy,
            executor,
            credentials,
        } = self.config;
        policy.validate()?;

        let cache_config = cache_config(&policy);
        let cache = match self.embedder {
            Some(embedder) => TieredCache::with_embedder(&cache_config, embedder),
            None => TieredCache::new(&cache_config),
        };
        let telemetry = Telemetry::new(&policy.telemetry);
        let policy = Arc::new(policy);
        let store = Arc::new(StubStore::new());
        let mut engine = RulesEngine::new(store.clone(), policy.clone());
        if let Some(reranker) = self.reranker {
            engine = engine.with_reranker(reranker);
        }

        Ok(Client {
            policy,
            store,
            engine,
            cache,
            executor: Executor::new(executor)?,
            telemetry,
            credentials,
            interpreter: self.interpreter,
            renderer: self
                .renderer
                .unwrap_or_else(|| Arc::new(PlainRenderer::new())),
            descriptor: Mutex::new(None),
        })
    }
}

/// The single entry point: text or stub calls in, [`ApiResult`]s out.
pub struct Client {
    policy: Arc<Policy>,
    store: Arc<StubStore>,
    engine: RulesEngine,
    cache: TieredCache,
    executor: Executor,
    telemetry: Telemetry,
    credentials: Credentials,
    interpreter: Option<Arc<dyn Interpreter>>,
    renderer: Arc<dyn Renderer>,
    descriptor: Mutex<Option<Arc<Descriptor>>>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    fn current(&self) -> MutexGuard<'_, Option<Arc<Descriptor>>> {
        self.descriptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Compile `descriptor` into stubs. Returns the stub count.
    ///
    /// Idempotent: once started, later calls keep the loaded descriptor.
    /// Use [`Client::restart`] to replace it.
    pub fn start(&self, descriptor: Descriptor) -> ClientResult<usize> {
        let mut current = self.current();
        if let Some(loaded) = current.as_ref() {
            tracing::debug!(service = %loaded.name, "client already started");
            return Ok(self.store.len());
        }
        let count = self.load(&descriptor)?;
        *current = Some(Arc::new(descriptor));
        Ok(count)
    }

    /// Swap in a new descriptor and drop every cached response.
    pub fn restart(&self, descriptor: Descriptor) -> ClientResult<usize> {
        let mut current = self.current();
        let count = self.load(&descriptor)?;
        self.cache.clear();
        *current = Some(Arc::new(descriptor));
        Ok(count)
    }

    fn load(&self, descriptor: &Descriptor) -> ClientResult<usize> {
        descriptor.validate()?;
        let count = self.store.compile_from_descriptor(descriptor)?;
        self.renderer.load_templates(&self.store.list_all());
        tracing::info!(
            service = %descriptor.name,
            base_url = %descriptor.base_url,
            stubs = count,
            "client started"
        );
        Ok(count)
    }

    fn started(&self) -> ClientResult<Arc<Descriptor>> {
        self.current().clone().ok_or(ClientError::NotStarted)
    }

    pub fn is_started(&self) -> bool {
        self.current().is_some()
    }

    /// The routing decision for `text`, without executing anything.
    pub fn route(&self, text: &str) -> ClientResult<RouteResult> {
        Ok(self.engine.route(text)?)
    }

    pub async fn call(&self, request: impl Into<Request>) -> ClientResult<ApiResult> {
        let descriptor = self.started()?;
        match request.into() {
            Request::Text(text) => self.call_text(&text, &descriptor).await,
            Request::Stub { name, args } => {
                let stub = self.stub(&name)?;
                self.execute_stub(&stub, args, Via::Direct, 1.0, None).await
            }
        }
    }

    async fn call_text(&self, text: &str, descriptor: &Descriptor) -> ClientResult<ApiResult> {
        let route = self.engine.route(text)?;
        if route.decision == Decision::Fallback {
            return Ok(self.fallback(text, descriptor).await);
        }
        let stub = self.stub(&route.endpoint)?;
        let via = match route.decision {
            Decision::Direct => Via::Direct,
            _ => Via::Llm,
        };
        self.execute_stub(&stub, route.args, via, route.confidence, Some(text))
            .await
    }

    fn stub(&self, name: &str) -> ClientResult<Arc<Stub>> {
        self.store
            .get(name)
            .ok_or_else(|| RouterError::UnknownStub(name.to_string()).into())
    }

    async fn execute_stub(
        &self,
        stub: &Stub,
        args: Map<String, Value>,
        via: Via,
        confidence: f64,
        semantic: Option<&str>,
    ) -> ClientResult<ApiResult> {
        let start = Instant::now();
        let key = cache_key(&stub.name, &stub.version, &args);
        let event = || TelemetryEvent::new(&stub.name, via).confidence(confidence);

        if let Some(value) = self.cache.get(&key, semantic).await {
            let ms = elapsed_ms(start);
            let rendered = self.renderer.render(&stub.name, Some(&value));
            self.telemetry.record(event().latency(ms).cache_hit(true));
            tracing::info!(endpoint = %stub.name, %via, cache_hit = true, "call served from cache");
            return Ok(ApiResult::from_cache(value, ms).with_rendered(rendered));
        }

        let request = call_request(stub, args);
        let mut result = match self.executor.call(&request, &self.credentials).await {
            Ok(result) => result,
            Err(e) => {
                self.telemetry
                    .record(event().latency(elapsed_ms(start)).success(false));
                tracing::warn!(endpoint = %stub.name, error = %e, "call rejected");
                return Err(e.into());
            }
        };

        if result.success {
            let rendered = self.renderer.render(&stub.name, result.result.as_ref());
            result.rendered_text = Some(rendered);
            let ttl = self.policy.ttl_for(stub);
            if let Some(value) = &result.result
                && ttl > 0
            {
                let ttl = Some(Duration::from_secs(ttl));
                self.cache.set(&key, value.clone(), ttl, semantic).await;
            }
        }

        self.telemetry
            .record(event().latency(result.duration_ms).success(result.success));
        if result.success {
            tracing::info!(
                endpoint = %stub.name,
                %via,
                confidence,
                status = result.status_code,
                duration_ms = result.duration_ms,
                "call completed"
            );
        } else {
            tracing::warn!(
                endpoint = %stub.name,
                status = result.status_code,
                error = result.error.as_deref().unwrap_or_default(),
                "call failed"
            );
        }
        Ok(result)
    }

    async fn fallback(&self, text: &str, descriptor: &Descriptor) -> ApiResult {
        let start = Instant::now();
        let result = match &self.interpreter {
            Some(interpreter) => match interpreter.interpret(text, Some(descriptor)).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, "interpreter failed");
                    ApiResult::failure(format!("interpreter failed: {e:#}"), elapsed_ms(start))
                }
            },
            None => {
                tracing::warn!("no interpreter configured, fallback failed");
                ApiResult::failure("no interpreter configured for fallback", elapsed_ms(start))
            }
        };

        self.telemetry.record(
            TelemetryEvent::new(LLM_FALLBACK, Via::Llm)
                .tokens(result.tokens_used)
                .latency(result.duration_ms)
                .success(result.success)
                .confidence(0.0),
        );
        result
    }

    /// Execute explicit stub calls concurrently, bypassing the cache.
    /// Results keep the input order.
    pub async fn call_batch(
        &self,
        calls: Vec<(String, Map<String, Value>)>,
    ) -> ClientResult<Vec<ApiResult>> {
        self.started()?;
        let mut stubs = Vec::with_capacity(calls.len());
        let mut requests = Vec::with_capacity(calls.len());
        for (name, args) in calls {
            let stub = self.stub(&name)?;
            requests.push(call_request(&stub, args));
            stubs.push(stub);
        }

        let mut results = BatchExecutor::new(&self.executor)
            .execute(&requests, &self.credentials)
            .await;
        for (stub, result) in stubs.iter().zip(results.iter_mut()) {
            if result.success {
                let rendered = self.renderer.render(&stub.name, result.result.as_ref());
                result.rendered_text = Some(rendered);
            }
            self.telemetry.record(
                TelemetryEvent::new(&stub.name, Via::Direct)
                    .latency(result.duration_ms)
                    .success(result.success)
                    .confidence(1.0),
            );
        }
        Ok(results)
    }

    pub fn has_stub(&self, name: &str) -> bool {
        self.store.contains(name)
    }

    pub fn export_stubs(&self) -> ClientResult<StubExport> {
        let descriptor = self.started()?;
        let stubs = self.store.list_all();
        Ok(StubExport {
            service: descriptor.name.clone(),
            base_url: descriptor.base_url.clone(),
            stubs: stubs.iter().map(|s| Stub::clone(s)).collect(),
            telemetry: self.telemetry.summary(),
        })
    }

    pub fn descriptor(&self) -> Option<Arc<Descriptor>> {
        self.current().clone()
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Bind `{param}` path segments from `args`; bound args are removed.
fn call_request(stub: &Stub, mut args: Map<String, Value>) -> CallRequest {
    let url = stub.bind_url(&mut args);
    CallRequest::new(stub.method, url)
        .args(args)
        .headers(stub.headers.clone())
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

//! Single-call HTTP execution with retries.

use std::collections::BTreeMap;
use std::time::Instant;

use reqwest::header::RETRY_AFTER;
use reqwest::{Method, StatusCode};
use sa_protocol::{ApiResult, HttpMethod};
use serde_json::{Map, Value, json};

use crate::config::{Credentials, ExecutorConfig};
use crate::error::{ExecutionError, ExecutionResult};
use crate::headers::resolve_headers;

/// One call to perform.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub method: HttpMethod,
    pub url: String,
    pub args: Map<String, Value>,
    /// Header template, possibly holding credential placeholders.
    pub headers: BTreeMap<String, String>,
}

impl CallRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            args: Map::new(),
            headers: BTreeMap::new(),
        }
    }

    pub fn args(mut self, args: Map<String, Value>) -> Self {
        self.args = args;
        self
    }

    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

struct RawResponse {
    status: StatusCode,
    retry_after: Option<u64>,
    body: String,
}

/// HTTP executor shared by direct and batch calls.
#[derive(Debug, Clone)]
pub struct Executor {
    client: reqwest::Client,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> ExecutionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(ExecutionError::ClientBuild)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Perform `request`, retrying timeouts and connection failures.
    ///
    /// Returns `Err` only for 401/403 and 429 responses. Every other
    /// failure is a failed [`ApiResult`].
    pub async fn call(
        &self,
        request: &CallRequest,
        credentials: &Credentials,
    ) -> ExecutionResult<ApiResult> {
        let headers = resolve_headers(
            &request.headers,
            credentials,
            &self.config.passthrough_headers,
        );
        let attempts = self.config.max_retries.max(1);
        let start = Instant::now();
        let mut last_error = String::new();
        let mut made = 0;

        for attempt in 1..=attempts {
            made = attempt;
            match self.attempt(request, &headers).await {
                Ok(raw) => return finish(raw, elapsed_ms(start)),
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_error = e.to_string();
                    if attempt < attempts {
                        let wait = self.config.backoff(attempt);
                        tracing::warn!(
                            url = %request.url,
                            attempt,
                            wait_ms = wait.as_millis() as u64,
                            error = %e,
                            "transient failure, retrying"
                        );
                        tokio::time::sleep(wait).await;
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                    break;
                }
            }
        }

        let error = format!("failed after {made} attempts: {last_error}");
        tracing::warn!(url = %request.url, method = %request.method, error = %error, "call failed");
        Ok(ApiResult::failure(error, elapsed_ms(start)))
    }

    async fn attempt(
        &self,
        request: &CallRequest,
        headers: &BTreeMap<String, String>,
    ) -> Result<RawResponse, reqwest::Error> {
        let mut builder = self
            .client
            .request(to_reqwest(request.method), &request.url);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.args.is_empty() {
            builder = if request.method.has_body() {
                builder.json(&request.args)
            } else {
                builder.query(&query_pairs(&request.args))
            };
        }

        let response = builder.send().await?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let body = response.text().await?;
        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

fn finish(raw: RawResponse, duration_ms: f64) -> ExecutionResult<ApiResult> {
    let code = raw.status.as_u16();
    if raw.status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ExecutionError::RateLimited {
            retry_after_secs: raw.retry_after,
        });
    }
    if matches!(raw.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(ExecutionError::Authentication { status: code });
    }

    let result = parse_body(&raw.body);
    let success = (200..400).contains(&code);
    let error = (!success).then(|| error_message(result.as_ref(), code));

    tracing::debug!(status = code, duration_ms, success, "call completed");
    Ok(ApiResult {
        success,
        status_code: code,
        result,
        rendered_text: None,
        error,
        duration_ms,
        tokens_used: 0,
        cache_hit: false,
    })
}

/// JSON when parseable, otherwise `{"raw": text}`; nothing for an empty body.
fn parse_body(body: &str) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    Some(serde_json::from_str(body).unwrap_or_else(|_| json!({ "raw": body })))
}

fn error_message(result: Option<&Value>, code: u16) -> String {
    let field = result.and_then(|r| r.get("error").or_else(|| r.get("message")));
    match field {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => format!("HTTP {code}"),
    }
}

fn query_pairs(args: &Map<String, Value>) -> Vec<(String, String)> {
    args.iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect()
}

fn to_reqwest(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

//! Stub compiler: turns descriptor endpoints into matchable call templates.
//!
//! A stub carries everything needed to call one endpoint without an
//! interpreter: the resolved URL, schemas, a header template with credential
//! placeholders, and the keywords and regex patterns the matchers use.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use sa_protocol::{
    API_KEY_PLACEHOLDER, AuthConfig, CREDENTIALS_PLACEHOLDER, Descriptor, EndpointInfo,
    HttpMethod, Schema, TOKEN_PLACEHOLDER, USER_AGENT,
};

use crate::error::{RouterError, RouterResult};
use crate::vocab::{ActionClass, method_keywords, tokenize};

static PATH_PARAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(\w+)\}").unwrap());

/// Words never treated as a resource in a summary.
const FILLER_WORDS: &[&str] = &["with", "from", "into", "that"];

/// A compiled, immutable call template for one (method, path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stub {
    pub name: String,
    pub method: HttpMethod,
    pub url: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Schema>,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_template: Option<String>,
    pub keywords: Vec<String>,
    pub patterns: Vec<String>,
    pub version: String,
}

impl Stub {
    /// `{param}` names in the path, in order.
    pub fn path_params(&self) -> Vec<&str> {
        PATH_PARAM
            .captures_iter(&self.path)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .collect()
    }

    /// The URL with `{param}` segments filled from `args`. Bound args are
    /// removed; placeholders without a value stay as written.
    pub fn bind_url(&self, args: &mut Map<String, Value>) -> String {
        PATH_PARAM
            .replace_all(&self.url, |caps: &Captures| match args.remove(&caps[1]) {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// Compile every endpoint in the descriptor.
///
/// All-or-nothing: the first endpoint that fails aborts the batch and the
/// error names its method and path.
pub fn compile_descriptor(descriptor: &Descriptor) -> RouterResult<Vec<Stub>> {
    descriptor.validate()?;

    let mut names = HashSet::new();
    let mut stubs = Vec::with_capacity(descriptor.endpoints.len());
    for endpoint in &descriptor.endpoints {
        let stub = compile_endpoint(descriptor, endpoint)?;
        if !names.insert(stub.name.clone()) {
            return Err(compile_error(
                endpoint,
                format!("stub name '{}' collides with another endpoint", stub.name),
            ));
        }
        stubs.push(stub);
    }
    tracing::debug!(
        service = %descriptor.name,
        stubs = stubs.len(),
        "compiled descriptor"
    );
    Ok(stubs)
}

/// Compile a single endpoint.
pub fn compile_endpoint(descriptor: &Descriptor, endpoint: &EndpointInfo) -> RouterResult<Stub> {
    let method = endpoint.http_method()?;
    let schemas = descriptor.schemas_for(&endpoint.path);
    let input_schema = schemas.and_then(|s| s.request.clone());

    if let Some(schema) = &input_schema {
        for (name, property) in &schema.properties {
            if let Some(pattern) = &property.pattern
                && let Err(e) = Regex::new(pattern)
            {
                return Err(compile_error(
                    endpoint,
                    format!("invalid pattern for property '{name}': {e}"),
                ));
            }
        }
    }

    let keywords = extract_keywords(endpoint, method);
    let patterns = generate_patterns(endpoint, method, &keywords);
    for pattern in &patterns {
        if let Err(e) = build_pattern(pattern) {
            return Err(compile_error(
                endpoint,
                format!("invalid pattern '{pattern}': {e}"),
            ));
        }
    }

    Ok(Stub {
        name: stub_name(method, &endpoint.path),
        method,
        url: join_url(&descriptor.base_url, &endpoint.path),
        path: endpoint.path.clone(),
        input_schema,
        output_schema: schemas.and_then(|s| s.response.clone()),
        headers: build_headers(&descriptor.auth),
        cache_ttl: descriptor.cache_hints.get(&endpoint.path).copied(),
        response_template: descriptor.response_templates.get(&endpoint.path).cloned(),
        keywords,
        patterns,
        version: descriptor.spec_version.clone(),
    })
}

/// Case-insensitive regex used for every stub pattern.
pub fn build_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Leading non-parameter path segment with a trailing `s` removed.
pub fn leading_resource(path: &str) -> Option<String> {
    let segment = path
        .split('/')
        .find(|part| !part.is_empty() && !part.starts_with('{'))?;
    let resource = match segment.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem,
        _ => segment,
    };
    Some(resource.to_lowercase())
}

fn compile_error(endpoint: &EndpointInfo, reason: String) -> RouterError {
    RouterError::StubCompilation {
        method: endpoint.method.clone(),
        path: endpoint.path.clone(),
        reason,
    }
}

/// `GET /users/{id}` → `fetch_users_by_id`, `POST /todo` → `post_todo`.
fn stub_name(method: HttpMethod, path: &str) -> String {
    let body = PATH_PARAM
        .replace_all(path.trim_matches('/'), "by_${1}")
        .replace('/', "_");
    let prefix = match method {
        HttpMethod::Get if path.contains('{') => "fetch".to_string(),
        HttpMethod::Get => "list".to_string(),
        other => other.as_str().to_lowercase(),
    };
    if body.is_empty() {
        prefix
    } else {
        format!("{prefix}_{body}")
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn extract_keywords(endpoint: &EndpointInfo, method: HttpMethod) -> Vec<String> {
    let summary_words = tokenize(&endpoint.summary);
    let path_words = endpoint
        .path
        .split('/')
        .filter(|part| !part.starts_with('{'))
        .map(str::to_lowercase);
    let method_words = method_keywords(method).iter().map(|w| w.to_string());

    let mut seen = HashSet::new();
    summary_words
        .into_iter()
        .chain(path_words)
        .chain(method_words)
        .filter(|word| word.chars().count() > 2 && seen.insert(word.clone()))
        .collect()
}

fn generate_patterns(
    endpoint: &EndpointInfo,
    method: HttpMethod,
    keywords: &[String],
) -> Vec<String> {
    let mut patterns = Vec::new();

    if let Some(resource) = leading_resource(&endpoint.path) {
        let resource = regex::escape(&resource);
        patterns.push(match method {
            HttpMethod::Post => format!("(create|add|new).*{resource}"),
            HttpMethod::Get if endpoint.path.contains('{') => {
                format!(r"(get|fetch|show).*{resource}.*\b\w+\b")
            }
            HttpMethod::Get => format!("(list|get|show).*{resource}"),
            HttpMethod::Put | HttpMethod::Patch => format!("(update|edit|modify).*{resource}"),
            HttpMethod::Delete => format!("(delete|remove).*{resource}"),
        });
    }

    if let Some(pattern) = summary_pattern(&endpoint.summary) {
        patterns.push(pattern);
    }

    if keywords.len() >= 2 {
        let top: Vec<String> = keywords.iter().take(3).map(|k| regex::escape(k)).collect();
        patterns.push(format!(".*{}.*", top.join(".*")));
    }

    patterns
}

/// First action verb and first resource-looking word of a summary.
fn summary_pattern(summary: &str) -> Option<String> {
    let mut action = None;
    let mut resource = None;

    for raw in summary.split_whitespace() {
        let word = raw
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if word.is_empty() {
            continue;
        }
        if let Some(class) = ActionClass::of_word(&word) {
            if action.is_none() {
                let synonyms = class.verbs()[..3].join("|");
                action = Some(format!("({}|{synonyms})", regex::escape(&word)));
            }
        } else if resource.is_none()
            && word.chars().count() > 3
            && !FILLER_WORDS.contains(&word.as_str())
        {
            resource = Some(regex::escape(&word));
        }
    }

    Some(format!(".*{}.*{}.*", action?, resource?))
}

fn build_headers(auth: &AuthConfig) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::from([
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Accept".to_string(), "application/json".to_string()),
        ("User-Agent".to_string(), USER_AGENT.to_string()),
    ]);
    match auth {
        AuthConfig::None => {}
        AuthConfig::Bearer { .. } => {
            headers.insert("Authorization".into(), TOKEN_PLACEHOLDER.into());
        }
        AuthConfig::ApiKey { header, .. } => {
            headers.insert(header.clone(), API_KEY_PLACEHOLDER.into());
        }
        AuthConfig::Basic { .. } => {
            headers.insert("Authorization".into(), CREDENTIALS_PLACEHOLDER.into());
        }
    }
    headers
}

//! Response rendering: turn a JSON payload into a short line of text.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use regex::{Captures, Regex};
use sa_router::Stub;
use serde_json::Value;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([\w.]+)\}").unwrap());

/// Renders a response body for one endpoint.
pub trait Renderer: Send + Sync {
    fn render(&self, endpoint: &str, data: Option<&Value>) -> String;

    /// Called on start with the freshly compiled stubs.
    fn load_templates(&self, _stubs: &[Arc<Stub>]) {}
}

/// Default renderer: `{key}` / `{a.b}` placeholder templates keyed by stub
/// name, falling back to a generic summary of the payload.
#[derive(Debug, Default)]
pub struct PlainRenderer {
    templates: RwLock<HashMap<String, String>>,
}

impl PlainRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_template(&self, endpoint: impl Into<String>, template: impl Into<String>) {
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(endpoint.into(), template.into());
    }

    pub fn remove_template(&self, endpoint: &str) -> bool {
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(endpoint)
            .is_some()
    }

    pub fn clear(&self) {
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn template(&self, endpoint: &str) -> Option<String> {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(endpoint)
            .cloned()
    }
}

impl Renderer for PlainRenderer {
    fn render(&self, endpoint: &str, data: Option<&Value>) -> String {
        match self.template(endpoint) {
            Some(template) if !template.is_empty() => fill(&template, data),
            _ => summarize(data),
        }
    }

    fn load_templates(&self, stubs: &[Arc<Stub>]) {
        let mut templates = self
            .templates
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        templates.clear();
        for stub in stubs {
            if let Some(template) = &stub.response_template {
                templates.insert(stub.name.clone(), template.clone());
            }
        }
    }
}

/// Substitute placeholders found in an object payload. Unknown keys stay
/// as written.
fn fill(template: &str, data: Option<&Value>) -> String {
    let Some(Value::Object(_)) = data else {
        return template.to_string();
    };
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            match data.and_then(|d| lookup(d, &caps[1])) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => caps[0].to_string(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}

fn lookup<'v>(data: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .try_fold(data, |current, part| current.get(part))
}

/// Generic one-line description of a payload.
pub fn summarize(data: Option<&Value>) -> String {
    let Some(data) = data else {
        return "Success".into();
    };
    match data {
        Value::Null => "Success".into(),
        Value::Object(map) => {
            if let Some(message) = map.get("message") {
                scalar(message)
            } else if let Some(status) = map.get("status") {
                format!("Status: {}", scalar(status))
            } else if let (Some(id), Some(name)) = (map.get("id"), map.get("name")) {
                format!("{} (ID: {})", scalar(name), scalar(id))
            } else if let Some(id) = map.get("id") {
                format!("Created with ID: {}", scalar(id))
            } else if let Some(success) = map.get("success") {
                let ok = success.as_bool().unwrap_or(false);
                String::from(if ok { "Success" } else { "Failed" })
            } else if let Some(result) = map.get("result") {
                summarize(Some(result))
            } else {
                pretty(data)
            }
        }
        Value::Array(items) => match items.as_slice() {
            [] => "Empty list".into(),
            [only] => format!("1 item: {}", summarize(Some(only))),
            _ => format!("{} items", items.len()),
        },
        other => scalar(other),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => pretty(value),
        other => other.to_string(),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

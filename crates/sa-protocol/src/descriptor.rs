//! API descriptor: the document a service publishes to describe its endpoints.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::schema::Schema;

/// Hard upper bound on an encoded descriptor.
pub const MAX_DESCRIPTOR_BYTES: usize = 8 * 1024;
/// Descriptors above this size still load but log a warning.
pub const RECOMMENDED_DESCRIPTOR_BYTES: usize = 3 * 1024;

/// HTTP methods an endpoint may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether arguments travel in a JSON body rather than the query string.
    pub fn has_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ();

    /// Strict: descriptors must use uppercase method names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(()),
        }
    }
}

/// A single endpoint as listed in the descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub path: String,
    /// Kept as text so validation can report the offending value.
    pub method: String,
    #[serde(default)]
    pub summary: String,
}

impl EndpointInfo {
    pub fn new(method: HttpMethod, path: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.as_str().to_string(),
            summary: summary.into(),
        }
    }

    pub fn http_method(&self) -> DiscoveryResult<HttpMethod> {
        self.method
            .parse()
            .map_err(|_| DiscoveryError::InvalidMethod {
                method: self.method.clone(),
                path: self.path.clone(),
            })
    }
}

/// Request and response schemas registered for one path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointSchemas {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Schema>,
}

/// Authentication scheme the service expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    ApiKey {
        #[serde(default = "default_api_key_header")]
        header: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Basic {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

/// User agent sent with every stub call.
pub const USER_AGENT: &str = concat!("socket-agent/", env!("CARGO_PKG_VERSION"));

/// Header value slots filled in with caller credentials at execution time.
pub const TOKEN_PLACEHOLDER: &str = "${token}";
pub const API_KEY_PLACEHOLDER: &str = "${api_key}";
pub const CREDENTIALS_PLACEHOLDER: &str = "${credentials}";

fn default_api_key_header() -> String {
    "X-API-Key".into()
}

fn default_spec_version() -> String {
    "2025-01-01".into()
}

/// The full service descriptor consumed once at client start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "baseUrl")]
    pub base_url: String,
    pub endpoints: Vec<EndpointInfo>,
    /// Schemas keyed by endpoint path.
    #[serde(default, alias = "schema")]
    pub schemas: BTreeMap<String, EndpointSchemas>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub examples: Vec<String>,
    /// Response templates keyed by endpoint path.
    #[serde(default)]
    pub response_templates: BTreeMap<String, String>,
    /// Cache TTL hints (seconds) keyed by endpoint path.
    #[serde(default)]
    pub cache_hints: BTreeMap<String, u64>,
    #[serde(rename = "specVersion", default = "default_spec_version")]
    pub spec_version: String,
}

impl Descriptor {
    /// Parse a raw descriptor document, enforcing the size limit and
    /// structural validation.
    pub fn from_json(raw: &str) -> DiscoveryResult<Self> {
        check_size(raw.len())?;
        let descriptor: Self = serde_json::from_str(raw)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Compact JSON size of this descriptor in bytes.
    pub fn encoded_size(&self) -> usize {
        serde_json::to_vec(self).map(|b| b.len()).unwrap_or(0)
    }

    pub fn validate(&self) -> DiscoveryResult<()> {
        if self.name.trim().is_empty() {
            return Err(DiscoveryError::MissingField("name"));
        }
        if self.base_url.trim().is_empty() {
            return Err(DiscoveryError::MissingField("base_url"));
        }
        if self.endpoints.is_empty() {
            return Err(DiscoveryError::NoEndpoints);
        }

        let mut seen = HashSet::new();
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            if endpoint.path.trim().is_empty() {
                return Err(DiscoveryError::MissingPath { index });
            }
            let method = endpoint.http_method()?;
            if !seen.insert((method, endpoint.path.as_str())) {
                return Err(DiscoveryError::DuplicateEndpoint {
                    method: endpoint.method.clone(),
                    path: endpoint.path.clone(),
                });
            }
        }

        for (path, schemas) in &self.schemas {
            if let Some(request) = &schemas.request {
                request.validate(&format!("{path}.request"))?;
            }
            if let Some(response) = &schemas.response {
                response.validate(&format!("{path}.response"))?;
            }
        }
        Ok(())
    }

    pub fn schemas_for(&self, path: &str) -> Option<&EndpointSchemas> {
        self.schemas.get(path)
    }
}

fn check_size(size: usize) -> DiscoveryResult<()> {
    if size > MAX_DESCRIPTOR_BYTES {
        return Err(DiscoveryError::TooLarge {
            size,
            limit: MAX_DESCRIPTOR_BYTES,
        });
    }
    if size > RECOMMENDED_DESCRIPTOR_BYTES {
        tracing::warn!(
            size,
            recommended = RECOMMENDED_DESCRIPTOR_BYTES,
            "descriptor exceeds recommended size"
        );
    }
    Ok(())
}

/// Metadata registered for one endpoint before building a descriptor.
#[derive(Debug, Clone)]
pub struct EndpointRegistration {
    pub method: HttpMethod,
    pub path: String,
    pub summary: String,
    pub request_schema: Option<Schema>,
    pub response_schema: Option<Schema>,
    pub examples: Vec<String>,
}

impl EndpointRegistration {
    pub fn new(method: HttpMethod, path: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            summary: summary.into(),
            request_schema: None,
            response_schema: None,
            examples: Vec::new(),
        }
    }

    pub fn request(mut self, schema: Schema) -> Self {
        self.request_schema = Some(schema);
        self
    }

    pub fn response(mut self, schema: Schema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }
}

/// Assembles a [`Descriptor`] from explicit endpoint registrations.
///
/// Registrations are kept in a side table and only merged into the
/// descriptor on [`build`](Self::build), which also validates the result
/// and enforces the size limit.
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    name: String,
    description: String,
    base_url: String,
    auth: AuthConfig,
    spec_version: String,
    registrations: Vec<EndpointRegistration>,
    response_templates: BTreeMap<String, String>,
    cache_hints: BTreeMap<String, u64>,
}

impl DescriptorBuilder {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            base_url: base_url.into(),
            auth: AuthConfig::None,
            spec_version: default_spec_version(),
            registrations: Vec::new(),
            response_templates: BTreeMap::new(),
            cache_hints: BTreeMap::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn spec_version(mut self, version: impl Into<String>) -> Self {
        self.spec_version = version.into();
        self
    }

    pub fn register(mut self, registration: EndpointRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    pub fn response_template(
        mut self,
        path: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.response_templates
            .insert(path.into(), template.into());
        self
    }

    pub fn cache_hint(mut self, path: impl Into<String>, ttl_secs: u64) -> Self {
        self.cache_hints.insert(path.into(), ttl_secs);
        self
    }

    pub fn build(self) -> DiscoveryResult<Descriptor> {
        let mut endpoints = Vec::with_capacity(self.registrations.len());
        let mut schemas: BTreeMap<String, EndpointSchemas> = BTreeMap::new();
        let mut examples = Vec::new();

        for registration in self.registrations {
            endpoints.push(EndpointInfo::new(
                registration.method,
                registration.path.clone(),
                registration.summary,
            ));
            if registration.request_schema.is_some() || registration.response_schema.is_some() {
                let entry = schemas.entry(registration.path).or_default();
                if let Some(request) = registration.request_schema {
                    entry.request = Some(request);
                }
                if let Some(response) = registration.response_schema {
                    entry.response = Some(response);
                }
            }
            examples.extend(registration.examples);
        }

        let descriptor = Descriptor {
            name: self.name,
            description: self.description,
            base_url: self.base_url,
            endpoints,
            schemas,
            auth: self.auth,
            examples,
            response_templates: self.response_templates,
            cache_hints: self.cache_hints,
            spec_version: self.spec_version,
        };
        descriptor.validate()?;
        check_size(descriptor.encoded_size())?;
        Ok(descriptor)
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DiscoveryError;

/// JSON-schema primitive type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Null,
    /// Any type name not listed above.
    #[serde(other)]
    Unknown,
}

/// A (subset of) JSON schema attached to an endpoint's request or response.
///
/// Keys outside the typed subset are kept in `extra` so that descriptors
/// survive a parse/serialize cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SchemaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Object properties, kept sorted so traversal order is deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Schema {
    pub fn of(kind: SchemaType) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Convenience constructor for an object schema.
    pub fn object<I, K>(properties: I, required: &[&str]) -> Self
    where
        I: IntoIterator<Item = (K, Schema)>,
        K: Into<String>,
    {
        Self {
            kind: Some(SchemaType::Object),
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            required: required.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = values;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn is_required(&self, property: &str) -> bool {
        self.required.iter().any(|r| r == property)
    }

    /// Structural checks: required keys must be declared properties and
    /// numeric bounds must be ordered. Recurses into properties and items.
    pub fn validate(&self, context: &str) -> Result<(), DiscoveryError> {
        if !self.properties.is_empty() {
            for name in &self.required {
                if !self.properties.contains_key(name) {
                    return Err(DiscoveryError::MalformedSchema {
                        context: context.to_string(),
                        reason: format!("required property '{name}' is not declared"),
                    });
                }
            }
        }

        if let (Some(min), Some(max)) = (self.minimum, self.maximum)
            && min > max
        {
            return Err(DiscoveryError::MalformedSchema {
                context: context.to_string(),
                reason: format!("minimum {min} is greater than maximum {max}"),
            });
        }

        for (name, property) in &self.properties {
            property.validate(&format!("{context}.{name}"))?;
        }
        if let Some(items) = &self.items {
            items.validate(&format!("{context}[]"))?;
        }
        Ok(())
    }
}

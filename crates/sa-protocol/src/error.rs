use thiserror::Error;

/// Errors raised while parsing or validating an API descriptor.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("descriptor missing required field: {0}")]
    MissingField(&'static str),

    #[error("descriptor has no endpoints")]
    NoEndpoints,

    #[error("endpoint #{index} is missing a path")]
    MissingPath { index: usize },

    #[error("invalid HTTP method '{method}' for {path}")]
    InvalidMethod { method: String, path: String },

    #[error("duplicate endpoint: {method} {path}")]
    DuplicateEndpoint { method: String, path: String },

    #[error("malformed schema at {context}: {reason}")]
    MalformedSchema { context: String, reason: String },

    #[error("descriptor size ({size} bytes) exceeds maximum of {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("invalid descriptor JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

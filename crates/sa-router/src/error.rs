use sa_protocol::DiscoveryError;
use thiserror::Error;

/// Errors from stub compilation, routing, and policy construction.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("failed to compile stub for {method} {path}: {reason}")]
    StubCompilation {
        method: String,
        path: String,
        reason: String,
    },

    #[error("cannot route empty input")]
    EmptyInput,

    #[error("unknown stub: {0}")]
    UnknownStub(String),

    #[error("invalid policy: {0}")]
    Policy(String),
}

pub type RouterResult<T> = Result<T, RouterError>;

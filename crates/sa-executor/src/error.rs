use thiserror::Error;

/// Failures that propagate out of [`Executor::call`](crate::Executor::call).
///
/// Transport failures and exhausted retries are not errors: they come back
/// as a failed `ApiResult`.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("authentication failed: HTTP {status}")]
    Authentication { status: u16 },

    #[error("rate limited{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

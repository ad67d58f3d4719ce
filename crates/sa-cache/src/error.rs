use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to compute value: {0}")]
    Compute(String),

    #[error("embedding failed: {0}")]
    Embedding(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

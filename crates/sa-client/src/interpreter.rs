use async_trait::async_trait;
use sa_protocol::{ApiResult, Descriptor};

/// External natural-language interpreter, consulted only when routing
/// falls back.
///
/// Implementations own their own transport and report the tokens they
/// spent through [`ApiResult::tokens_used`].
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn interpret(
        &self,
        text: &str,
        descriptor: Option<&Descriptor>,
    ) -> anyhow::Result<ApiResult>;
}

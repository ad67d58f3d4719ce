//! Bounded-concurrency batch execution.

use std::time::Instant;

use futures::stream::{self, StreamExt};
use sa_protocol::ApiResult;

use crate::config::Credentials;
use crate::executor::{CallRequest, Executor, elapsed_ms};

/// Runs many calls through one [`Executor`], at most `max_concurrent` at a
/// time. Results come back in request order.
pub struct BatchExecutor<'a> {
    executor: &'a Executor,
    max_concurrent: usize,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self {
            executor,
            max_concurrent: executor.config().max_concurrent,
        }
    }

    pub fn with_concurrency(executor: &'a Executor, max_concurrent: usize) -> Self {
        Self {
            executor,
            max_concurrent,
        }
    }

    /// Every request yields exactly one result; propagated errors become
    /// failed entries.
    pub async fn execute(
        &self,
        requests: &[CallRequest],
        credentials: &Credentials,
    ) -> Vec<ApiResult> {
        stream::iter(requests)
            .map(|request| async move {
                let start = Instant::now();
                match self.executor.call(request, credentials).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!(url = %request.url, error = %e, "batch entry failed");
                        ApiResult::failure(e.to_string(), elapsed_ms(start))
                    }
                }
            })
            .buffered(self.max_concurrent.max(1))
            .collect()
            .await
    }
}

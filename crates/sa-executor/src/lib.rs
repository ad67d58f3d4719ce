//! HTTP execution of compiled stub calls.

pub mod batch;
pub mod config;
pub mod error;
pub mod executor;
pub mod headers;

pub use batch::BatchExecutor;
pub use config::{Credentials, ExecutorConfig};
pub use error::{ExecutionError, ExecutionResult};
pub use executor::{CallRequest, Executor};
pub use headers::resolve_headers;

use sa_executor::ExecutionError;
use sa_protocol::DiscoveryError;
use sa_router::RouterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client not started: call start() with a descriptor first")]
    NotStarted,

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Routing(#[from] RouterError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

pub type ClientResult<T> = Result<T, ClientError>;

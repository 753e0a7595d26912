use thiserror::Error;
use trellis_orchestration::OrchestrationError;
use trellis_queue::QueueError;
use trellis_store::StoreError;
use trellis_types::RunId;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("run {0} not found")]
    NotFound(RunId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A rule aborted the transition attempt; nothing was committed.
    #[error("transition aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<OrchestrationError> for ServiceError {
    fn from(err: OrchestrationError) -> Self {
        match err {
            OrchestrationError::RunNotFound(id) => ServiceError::NotFound(id),
            OrchestrationError::Aborted(reason) => ServiceError::Aborted(reason),
            OrchestrationError::Store(err) => ServiceError::Store(err),
        }
    }
}

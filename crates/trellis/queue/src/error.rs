use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The topic (or every topic of a multi-queue) was closed and has
    /// no items left to drain.
    #[error("queue \"{0}\" is closed")]
    Closed(String),
}

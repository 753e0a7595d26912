//! Store error types

use thiserror::Error;
use trellis_types::RunId;

/// Errors from run storage backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run not found: {0}")]
    NotFound(RunId),

    /// Transient conflict; the caller may retry the whole attempt
    #[error("storage conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

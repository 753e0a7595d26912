//! Orchestration error types

use thiserror::Error;
use trellis_store::StoreError;
use trellis_types::RunId;

/// Errors from the orchestration engine.
///
/// A rejected or waiting transition is NOT an error; those outcomes
/// come back as a structured [`trellis_types::OrchestrationResult`].
/// Errors are reserved for aborts and infrastructure failures.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("run not found: {0}")]
    RunNotFound(RunId),

    /// A rule raised a terminal orchestration error mid-chain. All
    /// entered rule scopes were unwound before this was surfaced; no
    /// state was committed.
    #[error("transition aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

//! MixVoice Error Types
//!
//! Parse and execution failures are values (`CommandKind::Unknown`, failed
//! `ExecutionResult`); only persistence, config and prompt plumbing use these.

use thiserror::Error;
use uuid::Uuid;

/// Central error type for MixVoice
#[derive(Error, Debug)]
pub enum MixError {
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Dictionary storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prompt {0} is not currently showing")]
    PromptNotShowing(Uuid),

    #[error("Learning prompt orchestrator has shut down")]
    OrchestratorClosed,

    #[error("Lock poisoned: {0}")]
    Lock(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for MixVoice operations
pub type MixResult<T> = Result<T, MixError>;

/// Helper to convert Mutex poison errors
impl<T> From<std::sync::PoisonError<T>> for MixError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        MixError::Lock(err.to_string())
    }
}

impl From<tokio::task::JoinError> for MixError {
    fn from(err: tokio::task::JoinError) -> Self {
        MixError::Persistence(format!("storage task failed: {}", err))
    }
}

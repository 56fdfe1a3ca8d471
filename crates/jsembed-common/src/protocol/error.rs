use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    #[error("JavaScript evaluation error: {0}")]
    Evaluation(String),

    #[error("Marshal error: {0}")]
    Marshal(String),

    #[error("Execution timed out after {0}ms")]
    Timeout(u64),

    #[error("Execution budget exhausted: {0}")]
    BudgetExhausted(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Refusing new work: {0} abandoned evaluations are still running")]
    Overloaded(usize),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

/// Coarse classification of an [`EmbedError`], stable across message changes.
///
/// Transports use this to pick a status code; the core never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ScriptNotFound,
    Evaluation,
    Marshal,
    Timeout,
    InvalidRequest,
    /// Too many timed-out evaluations are still winding down; retry later.
    Unavailable,
    Internal,
}

impl EmbedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EmbedError::ScriptNotFound(_) => ErrorKind::ScriptNotFound,
            EmbedError::Evaluation(_) => ErrorKind::Evaluation,
            EmbedError::Marshal(_) | EmbedError::JsonSerialization(_) => ErrorKind::Marshal,
            EmbedError::Timeout(_) | EmbedError::BudgetExhausted(_) => ErrorKind::Timeout,
            EmbedError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            EmbedError::Overloaded(_) => ErrorKind::Unavailable,
            EmbedError::Worker(_) | EmbedError::Io(_) => ErrorKind::Internal,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

pub type Result<T> = std::result::Result<T, EmbedError>;

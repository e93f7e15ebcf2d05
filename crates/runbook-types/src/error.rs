use thiserror::Error;

/// Errors raised by workflow persistence.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("workflow not found: '{0}'")]
    NotFound(String),

    #[error("invalid workflow: {0}")]
    Invalid(String),

    #[error("invalid workflow id: '{0}'")]
    InvalidId(String),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

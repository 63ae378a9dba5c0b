// Provider Error Types

/// Errors raised by external collaborators (catalog, decision engine)
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Resource not found")]
    NotFound,

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Rejected by collaborator: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

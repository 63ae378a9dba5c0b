use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid capability: {0}")]
    InvalidCapability(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The session was stopped; the client has to start a new one.
    #[error("Stale session: {0}")]
    StaleSession(String),

    #[error("Index {index} out of range (total {total})")]
    IndexOutOfRange { index: i64, total: i64 },

    #[error("Optimistic lock conflict")]
    OptimisticLockConflict,

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code for transport layers
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidCapability(_) => "invalid_capability",
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::StaleSession(_) => "stale_session",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::OptimisticLockConflict => "optimistic_lock_conflict",
            Self::Upstream(_) => "upstream",
            Self::Serialization(_) | Self::Internal(_) => "internal",
        }
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        Self::Upstream(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::NotFound("x".into()).code(), "not_found");
        assert_eq!(Error::StaleSession("x".into()).code(), "stale_session");
        assert_eq!(
            Error::IndexOutOfRange { index: 7, total: 5 }.code(),
            "index_out_of_range"
        );
        assert_eq!(Error::Internal("boom".into()).code(), "internal");
    }

    #[test]
    fn test_provider_error_maps_to_upstream() {
        let err: Error = ProviderError::Unavailable("engine offline".into()).into();
        assert!(matches!(err, Error::Upstream(ref msg) if msg.contains("engine offline")));
    }

    #[test]
    fn test_index_out_of_range_message() {
        let err = Error::IndexOutOfRange { index: -1, total: 5 };
        assert_eq!(err.to_string(), "Index -1 out of range (total 5)");
    }
}

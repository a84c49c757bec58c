use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input or a business-rule violation the caller can correct.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Referenced record does not exist or is soft-deleted.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidRequest(msg.into())
    }

    pub(crate) fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        EngineError::NotFound(format!("couldn't find {what} {id}"))
    }
}

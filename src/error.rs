use thiserror::Error;

use crate::auth::AuthError;
use crate::engine::EngineError;

/// Outcome classes a boundary maps to its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    Unauthenticated,
    Forbidden,
    Internal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Engine(EngineError::InvalidRequest(_)) => ErrorKind::InvalidRequest,
            ServiceError::Engine(EngineError::NotFound(_)) => ErrorKind::NotFound,
            ServiceError::Engine(EngineError::WalError(_)) => ErrorKind::Internal,
            ServiceError::Auth(AuthError::Unauthenticated(_)) => ErrorKind::Unauthenticated,
            ServiceError::Auth(AuthError::Forbidden(_)) => ErrorKind::Forbidden,
            ServiceError::Auth(AuthError::Signing(_)) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_stay_distinct() {
        let cases = [
            (ServiceError::from(EngineError::InvalidRequest("x".into())), ErrorKind::InvalidRequest),
            (ServiceError::from(EngineError::NotFound("x".into())), ErrorKind::NotFound),
            (ServiceError::from(EngineError::WalError("x".into())), ErrorKind::Internal),
            (ServiceError::from(AuthError::Unauthenticated("x".into())), ErrorKind::Unauthenticated),
            (ServiceError::from(AuthError::Forbidden("x".into())), ErrorKind::Forbidden),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn message_passes_through() {
        let err = ServiceError::from(EngineError::NotFound("couldn't find court 4".into()));
        assert_eq!(err.to_string(), "not found: couldn't find court 4");
    }
}

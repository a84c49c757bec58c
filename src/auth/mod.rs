pub mod policy;
pub mod session;
pub mod token;

pub use policy::{Action, Caller};
pub use session::{CredentialVerifier, SessionManager, TokenPair};
pub use token::{SessionClaims, TokenKind, TokenService};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable credentials: missing, malformed, tampered or expired token,
    /// unknown principal, wrong password.
    #[error("authentication failed: {0}")]
    Unauthenticated(String),
    /// Authenticated caller lacking the role or ownership an action needs.
    #[error("access denied: {0}")]
    Forbidden(String),
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// Short label for the auth-failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated(_) => "unauthenticated",
            AuthError::Forbidden(_) => "forbidden",
            AuthError::Signing(_) => "signing",
        }
    }
}

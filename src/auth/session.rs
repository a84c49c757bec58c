use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::engine::Engine;
use crate::model::User;
use crate::observability::AUTH_FAILURES_TOTAL;

use super::{AuthError, Caller, TokenKind, TokenService};

/// Checks a presented password against a stored hash. The hashing scheme is
/// the implementor's business.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, password: &str, password_hash: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

fn unauthenticated(reason: &'static str, message: &str) -> AuthError {
    metrics::counter!(AUTH_FAILURES_TOTAL, "reason" => reason).increment(1);
    debug!(reason, "authentication failed");
    AuthError::Unauthenticated(message.to_owned())
}

/// Token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or_else(|| unauthenticated("missing_header", "missing bearer token"))?;
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| unauthenticated("malformed_header", "malformed authorization header"))?;
    Ok(token)
}

/// Login, refresh and inbound authentication on top of `TokenService`.
pub struct SessionManager {
    tokens: TokenService,
    engine: Arc<Engine>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl SessionManager {
    pub fn new(
        tokens: TokenService,
        engine: Arc<Engine>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            tokens,
            engine,
            verifier,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    fn active_user(&self, phone: &str) -> Result<User, AuthError> {
        self.engine
            .find_user_by_phone(phone)
            .map_err(|_| unauthenticated("unknown_principal", "unknown or deleted user"))
    }

    /// Exchange a phone number and password for an access/refresh pair.
    pub async fn login(&self, phone: &str, password: &str) -> Result<TokenPair, AuthError> {
        // Same answer for an unknown phone and a wrong password.
        let user = self
            .engine
            .find_user_by_phone(phone)
            .map_err(|_| unauthenticated("bad_credentials", "bad credentials"))?;
        if !self.verifier.verify(password, &user.password_hash).await {
            return Err(unauthenticated("bad_credentials", "bad credentials"));
        }

        let pair = TokenPair {
            access_token: self.tokens.issue(&user.phone_number, TokenKind::Access)?,
            refresh_token: self.tokens.issue(&user.phone_number, TokenKind::Refresh)?,
        };
        info!(user_id = user.id, "session opened");
        Ok(pair)
    }

    /// New access token for the subject of a live refresh token.
    pub fn refresh(&self, refresh_token: &str) -> Result<String, AuthError> {
        let claims = self
            .tokens
            .validate(refresh_token, TokenKind::Refresh)
            .map_err(|_| unauthenticated("invalid_token", "invalid refresh token"))?;
        let user = self.active_user(&claims.sub)?;
        let access = self.tokens.issue(&user.phone_number, TokenKind::Access)?;
        debug!(user_id = user.id, "access token refreshed");
        Ok(access)
    }

    /// Resolve the caller behind an `Authorization` header. Roles come from
    /// the stored user, not from the token.
    pub fn authenticate(&self, header: Option<&str>) -> Result<Caller, AuthError> {
        let token = bearer_token(header)?;
        let claims = self
            .tokens
            .validate(token, TokenKind::Access)
            .map_err(|_| unauthenticated("invalid_token", "invalid access token"))?;
        let user = self.active_user(&claims.sub)?;
        Ok(Caller::from_user(&user))
    }
}

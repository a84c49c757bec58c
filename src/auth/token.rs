use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AuthConfig;
use crate::engine::now_ms;
use crate::model::Ms;
use crate::observability::TOKENS_ISSUED_TOTAL;

use super::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(TokenKind::Access),
            "refresh" => Ok(TokenKind::Refresh),
            other => Err(AuthError::Unauthenticated(format!("unknown token kind {other:?}"))),
        }
    }
}

/// Signed payload. Times are Unix seconds, as registered JWT claims are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn expires_at(&self) -> Ms {
        self.exp.saturating_mul(1000)
    }

    /// A token is dead from its expiry instant onwards.
    pub fn is_expired_at(&self, now: Ms) -> bool {
        self.expires_at() <= now
    }
}

/// Issues and checks HS256 session tokens. Holds no per-session state.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        // Expiry is compared in milliseconds against our own clock, with no leeway.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims = ["exp", "sub"].into_iter().map(String::from).collect();

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.jwt_secret.as_bytes(), config.access_ttl, config.refresh_ttl)
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    pub fn issue(&self, subject: &str, kind: TokenKind) -> Result<String, AuthError> {
        self.issue_at(subject, kind, now_ms())
    }

    /// Expiry is rounded up to the next whole second, so a token never
    /// lives shorter than its configured lifetime.
    pub fn issue_at(&self, subject: &str, kind: TokenKind, now: Ms) -> Result<String, AuthError> {
        let ttl_ms = self.ttl(kind).as_nanos().div_ceil(1_000_000);
        let ttl_ms = i64::try_from(ttl_ms).unwrap_or(i64::MAX);
        let claims = SessionClaims {
            sub: subject.to_owned(),
            kind,
            iat: now.div_euclid(1000),
            exp: now.saturating_add(ttl_ms).saturating_add(999).div_euclid(1000),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        metrics::counter!(TOKENS_ISSUED_TOTAL, "kind" => kind.as_str()).increment(1);
        debug!(subject, %kind, exp = claims.exp, "issued token");
        Ok(token)
    }

    /// Signature-checked claims, expired or not. Malformed or tampered
    /// tokens are an authentication failure.
    pub fn claims(&self, token: &str) -> Result<SessionClaims, AuthError> {
        decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "rejected undecodable token");
                AuthError::Unauthenticated("invalid token".into())
            })
    }

    /// Claims of a live token of the given kind.
    pub fn validate_at(
        &self,
        token: &str,
        kind: TokenKind,
        now: Ms,
    ) -> Result<SessionClaims, AuthError> {
        let claims = self.claims(token)?;
        if claims.kind != kind {
            debug!(expected = %kind, actual = %claims.kind, "rejected token of wrong kind");
            return Err(AuthError::Unauthenticated(format!("expected {kind} token")));
        }
        if claims.is_expired_at(now) {
            debug!(subject = %claims.sub, "rejected expired token");
            return Err(AuthError::Unauthenticated("token expired".into()));
        }
        Ok(claims)
    }

    pub fn validate(&self, token: &str, kind: TokenKind) -> Result<SessionClaims, AuthError> {
        self.validate_at(token, kind, now_ms())
    }

    /// True only for a live, untampered token of `expected_kind` (access when
    /// `None`) issued to `subject`.
    pub fn verify(&self, token: &str, subject: &str, expected_kind: Option<TokenKind>) -> bool {
        self.verify_at(token, subject, expected_kind, now_ms())
    }

    pub fn verify_at(
        &self,
        token: &str,
        subject: &str,
        expected_kind: Option<TokenKind>,
        now: Ms,
    ) -> bool {
        let kind = expected_kind.unwrap_or(TokenKind::Access);
        match self.validate_at(token, kind, now) {
            Ok(claims) if claims.sub == subject => true,
            Ok(claims) => {
                debug!(expected = subject, actual = %claims.sub, "rejected token for other subject");
                false
            }
            Err(_) => false,
        }
    }

    pub fn extract_subject(&self, token: &str) -> Result<String, AuthError> {
        self.claims(token).map(|c| c.sub)
    }

    pub fn extract_expiry(&self, token: &str) -> Result<Ms, AuthError> {
        self.claims(token).map(|c| c.expires_at())
    }

    pub fn extract_kind(&self, token: &str) -> Result<TokenKind, AuthError> {
        self.claims(token).map(|c| c.kind)
    }
}

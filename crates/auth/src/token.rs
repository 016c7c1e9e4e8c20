use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use saasbill_core::UserId;

use crate::claims::{SessionClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// An issued bearer token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user_id: UserId, now: DateTime<Utc>) -> Result<SessionToken, TokenError>;
}

/// Validates bearer tokens and yields the authenticated user id.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<UserId, TokenError>;
}

/// HS256 JWT session tokens signed with a shared secret.
///
/// Expiry is checked against the caller-supplied `now` rather than the
/// library clock.
#[derive(Clone)]
pub struct Hs256SessionTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl Hs256SessionTokens {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl TokenIssuer for Hs256SessionTokens {
    fn issue(&self, user_id: UserId, now: DateTime<Utc>) -> Result<SessionToken, TokenError> {
        let claims = SessionClaims::new(user_id, now, self.ttl);
        let expires_at = claims
            .expires_at()
            .ok_or_else(|| TokenError::Signing("expiry out of range".into()))?;
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        Ok(SessionToken { token, expires_at })
    }
}

impl TokenValidator for Hs256SessionTokens {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<UserId, TokenError> {
        let data = decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;
        match validate_claims(&data.claims, now) {
            Ok(()) => Ok(data.claims.sub),
            Err(TokenValidationError::Expired) => Err(TokenError::Expired),
            Err(other) => Err(TokenError::Invalid(other.to_string())),
        }
    }
}

impl core::fmt::Debug for Hs256SessionTokens {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256SessionTokens").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

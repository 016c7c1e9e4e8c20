use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use saasbill_core::UserId;

/// Tolerated clock drift when checking `iat`.
const ISSUED_AT_LEEWAY_SECS: i64 = 30;

/// Session token claims (transport-agnostic).
///
/// Timestamps are unix seconds so the encoded form stays a standard JWT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the authenticated user.
    pub sub: UserId,

    /// Issued-at (unix seconds).
    pub iat: i64,

    /// Expiration (unix seconds).
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(sub: UserId, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate session claims against `now`.
///
/// Signature verification happens before this, in the token codec.
pub fn validate_claims(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now + ISSUED_AT_LEEWAY_SECS < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims_at(now: DateTime<Utc>, ttl_secs: i64) -> SessionClaims {
        SessionClaims::new(UserId::new(), now, Duration::seconds(ttl_secs))
    }

    #[test]
    fn fresh_claims_are_valid() {
        let now = Utc::now();
        assert_eq!(validate_claims(&claims_at(now, 60), now), Ok(()));
    }

    #[test]
    fn claims_expire_exactly_at_exp() {
        let now = Utc::now();
        let claims = claims_at(now, 60);
        let at_exp = DateTime::from_timestamp(claims.exp, 0).unwrap();
        assert_eq!(validate_claims(&claims, at_exp), Err(TokenValidationError::Expired));
    }

    #[test]
    fn claims_from_the_future_are_rejected() {
        let now = Utc::now();
        let claims = claims_at(now + Duration::minutes(10), 60);
        assert_eq!(validate_claims(&claims, now), Err(TokenValidationError::NotYetValid));
    }

    #[test]
    fn small_issuer_drift_is_tolerated() {
        let now = Utc::now();
        let claims = claims_at(now + Duration::seconds(5), 60);
        assert_eq!(validate_claims(&claims, now), Ok(()));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let claims = SessionClaims {
            sub: UserId::new(),
            iat: 100,
            exp: 100,
        };
        assert_eq!(
            validate_claims(&claims, Utc::now()),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }
}

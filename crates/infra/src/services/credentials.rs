//! User registration, login and session-token checks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use saasbill_auth::{
    PasswordError, PasswordHasher, SessionToken, TokenError, TokenIssuer, TokenValidator, User, normalize_email,
    validate_password,
};
use saasbill_core::{DomainError, UserId};

use crate::store::{Record, StoreError, UserStore, with_deadline};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error(transparent)]
    InvalidInput(#[from] DomainError),

    #[error("email is already registered")]
    DuplicateEmail,

    /// Unknown email and wrong password are indistinguishable.
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token has expired")]
    ExpiredToken,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PasswordError> for CredentialError {
    fn from(e: PasswordError) -> Self {
        Self::Hashing(e.to_string())
    }
}

/// Registration, login and bearer-token validation.
#[derive(Clone)]
pub struct CredentialStore {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    issuer: Arc<dyn TokenIssuer>,
    validator: Arc<dyn TokenValidator>,
    timeout: Duration,
    /// Verified against when the email is unknown so both failure paths cost
    /// one hash verification.
    decoy_hash: Arc<str>,
}

impl CredentialStore {
    pub fn new(
        users: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        issuer: Arc<dyn TokenIssuer>,
        validator: Arc<dyn TokenValidator>,
        timeout: Duration,
    ) -> Result<Self, CredentialError> {
        let decoy_hash = hasher.hash("decoy-password-never-matches")?;
        Ok(Self {
            users,
            hasher,
            issuer,
            validator,
            timeout,
            decoy_hash: decoy_hash.into(),
        })
    }

    /// Create an account. The email is stored normalized.
    pub async fn register(&self, email: &str, password: &str) -> Result<User, CredentialError> {
        let email = normalize_email(email)?;
        validate_password(password)?;

        let password_hash = self.hash_blocking(password.to_string()).await?;
        let user = User::new(email, password_hash, Utc::now());

        match with_deadline(self.timeout, "insert_user", self.users.insert_user(&user)).await {
            Ok(()) => {
                info!(user_id = %user.id, "user registered");
                Ok(user)
            }
            Err(StoreError::Conflict(Record::User)) => Err(CredentialError::DuplicateEmail),
            Err(e) => Err(e.into()),
        }
    }

    /// Check credentials and issue a session token.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionToken, CredentialError> {
        let user = match normalize_email(email) {
            Ok(email) => with_deadline(self.timeout, "user_by_email", self.users.user_by_email(&email)).await?,
            Err(_) => None,
        };

        let (stored_hash, user_id) = match &user {
            Some(u) => (u.password_hash.clone(), Some(u.id)),
            None => (self.decoy_hash.to_string(), None),
        };
        let matches = self.verify_blocking(password.to_string(), stored_hash).await?;

        match (user_id, matches) {
            (Some(user_id), true) => {
                let token = self
                    .issuer
                    .issue(user_id, Utc::now())
                    .map_err(|e| CredentialError::Signing(e.to_string()))?;
                info!(user_id = %user_id, "login succeeded");
                Ok(token)
            }
            _ => {
                warn!("login rejected");
                Err(CredentialError::InvalidCredentials)
            }
        }
    }

    /// Resolve a bearer token to the user it was issued for.
    pub fn validate_token(&self, token: &str) -> Result<UserId, CredentialError> {
        self.validator.validate(token, Utc::now()).map_err(|e| match e {
            TokenError::Expired => CredentialError::ExpiredToken,
            TokenError::Invalid(reason) | TokenError::Signing(reason) => CredentialError::InvalidToken(reason),
        })
    }

    async fn hash_blocking(&self, password: String) -> Result<String, CredentialError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| CredentialError::Hashing(e.to_string()))?
            .map_err(CredentialError::from)
    }

    async fn verify_blocking(&self, password: String, stored: String) -> Result<bool, CredentialError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|e| CredentialError::Hashing(e.to_string()))?
            .map_err(CredentialError::from)
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::error;

use saasbill_auth::AuthzError;
use saasbill_core::DomainError;
use saasbill_infra::rate_limit::RateLimitError;
use saasbill_infra::services::{CredentialError, DirectoryError, LedgerError};
use saasbill_infra::store::StoreError;

use crate::app::envelope::{respond, ApiResponse, ErrorInfo};
use crate::context::current_request_id;

/// An error response: status plus the `error` object of the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn invalid_request(details: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", "Invalid request").with_details(details)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found")
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An unexpected error occurred",
        )
    }

    fn from_domain(err: &DomainError) -> Self {
        Self::invalid_request(err.detail())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let info = ErrorInfo {
            code: self.code.to_string(),
            message: self.message,
            details: self.details,
            timestamp: Utc::now(),
            request_id: current_request_id(),
        };
        respond(self.status, ApiResponse::<()>::failure(info))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-operation failures
// ─────────────────────────────────────────────────────────────────────────────

/// Code and message reported when an operation fails for reasons the caller
/// cannot fix. The underlying cause is logged, never returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failure {
    pub code: &'static str,
    pub message: &'static str,
}

impl Failure {
    const fn new(code: &'static str, message: &'static str) -> Self {
        Self { code, message }
    }

    fn report(self, cause: &dyn core::fmt::Display) -> ApiError {
        error!(code = self.code, error = %cause, "request failed");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, self.code, self.message)
    }
}

pub const REGISTRATION: Failure = Failure::new("REGISTRATION_ERROR", "Failed to register user");
pub const LOGIN: Failure = Failure::new("LOGIN_ERROR", "Failed to log in");
pub const ORGANIZATION_CREATE: Failure =
    Failure::new("ORGANIZATION_CREATE_ERROR", "Failed to create organization");
pub const ORGANIZATION_FETCH: Failure =
    Failure::new("ORGANIZATION_FETCH_ERROR", "Failed to fetch organizations");
pub const MEMBER_ADD: Failure = Failure::new("MEMBER_ADD_ERROR", "Failed to add member");
pub const PLANS_FETCH: Failure = Failure::new("PLANS_FETCH_ERROR", "Failed to fetch plans");
pub const SUBSCRIPTION_CREATE: Failure =
    Failure::new("SUBSCRIPTION_CREATE_ERROR", "Failed to create subscription");
pub const SUBSCRIPTION_FETCH: Failure =
    Failure::new("SUBSCRIPTION_FETCH_ERROR", "Failed to fetch subscription");
pub const INVOICES_FETCH: Failure = Failure::new("INVOICES_FETCH_ERROR", "Failed to fetch invoices");
pub const DATABASE: Failure = Failure::new("DATABASE_ERROR", "Database connection failed");
pub const AUTHORIZATION: Failure = Failure::new("AUTHORIZATION_ERROR", "Failed to check permissions");
pub const RATE_LIMIT: Failure = Failure::new("RATE_LIMIT_ERROR", "Rate limit check failed");

pub fn invalid_token() -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "Invalid or expired token")
}

/// Maps a service error to the response for the operation described by `failure`.
pub trait IntoApiError {
    fn into_api_error(self, failure: Failure) -> ApiError;
}

pub trait OrFail<T> {
    fn or_fail(self, failure: Failure) -> Result<T, ApiError>;
}

impl<T, E: IntoApiError> OrFail<T> for Result<T, E> {
    fn or_fail(self, failure: Failure) -> Result<T, ApiError> {
        self.map_err(|e| e.into_api_error(failure))
    }
}

impl IntoApiError for StoreError {
    fn into_api_error(self, failure: Failure) -> ApiError {
        failure.report(&self)
    }
}

impl IntoApiError for CredentialError {
    fn into_api_error(self, failure: Failure) -> ApiError {
        match self {
            CredentialError::InvalidInput(e) => ApiError::from_domain(&e),
            CredentialError::DuplicateEmail => ApiError::new(
                StatusCode::CONFLICT,
                "EMAIL_ALREADY_REGISTERED",
                "Email is already registered",
            ),
            CredentialError::InvalidCredentials => {
                ApiError::new(StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", "Invalid credentials")
            }
            CredentialError::InvalidToken(_) => invalid_token(),
            CredentialError::ExpiredToken => invalid_token().with_details("token has expired"),
            other @ (CredentialError::Hashing(_)
            | CredentialError::Signing(_)
            | CredentialError::Store(_)) => failure.report(&other),
        }
    }
}

impl IntoApiError for DirectoryError {
    fn into_api_error(self, failure: Failure) -> ApiError {
        match self {
            DirectoryError::InvalidInput(e) => ApiError::from_domain(&e),
            DirectoryError::OrgNotFound => ApiError::new(
                StatusCode::NOT_FOUND,
                "ORGANIZATION_NOT_FOUND",
                "Organization not found",
            ),
            DirectoryError::UserNotFound => {
                ApiError::new(StatusCode::NOT_FOUND, "USER_NOT_FOUND", "User not found")
            }
            DirectoryError::DuplicateMembership => ApiError::new(
                StatusCode::CONFLICT,
                "MEMBER_ALREADY_EXISTS",
                "User is already a member of this organization",
            ),
            DirectoryError::NotAMember => not_a_member(),
            other @ DirectoryError::Store(_) => failure.report(&other),
        }
    }
}

impl IntoApiError for LedgerError {
    fn into_api_error(self, failure: Failure) -> ApiError {
        match self {
            LedgerError::InvalidInput(e) => ApiError::from_domain(&e),
            LedgerError::PlanNotFound => {
                ApiError::new(StatusCode::NOT_FOUND, "PLAN_NOT_FOUND", "Plan not found")
            }
            LedgerError::OrgNotFound => ApiError::new(
                StatusCode::NOT_FOUND,
                "ORGANIZATION_NOT_FOUND",
                "Organization not found",
            ),
            LedgerError::AlreadySubscribed => ApiError::new(
                StatusCode::CONFLICT,
                "SUBSCRIPTION_ALREADY_ACTIVE",
                "Organization already has an active subscription",
            ),
            other @ LedgerError::Store(_) => failure.report(&other),
        }
    }
}

impl IntoApiError for AuthzError {
    fn into_api_error(self, failure: Failure) -> ApiError {
        match self {
            AuthzError::NotAMember => not_a_member(),
            AuthzError::InsufficientRole(_) => ApiError::new(
                StatusCode::FORBIDDEN,
                "INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions",
            ),
            other @ AuthzError::Unavailable(_) => failure.report(&other),
        }
    }
}

impl IntoApiError for RateLimitError {
    fn into_api_error(self, failure: Failure) -> ApiError {
        failure.report(&self)
    }
}

fn not_a_member() -> ApiError {
    ApiError::new(
        StatusCode::FORBIDDEN,
        "NOT_A_MEMBER",
        "User is not a member of this organization",
    )
}

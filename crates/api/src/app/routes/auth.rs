use std::sync::Arc;

use axum::{extract::Extension, response::Response};

use crate::app::dto::{CredentialsRequest, RegisteredResponse, TokenResponse};
use crate::app::envelope::{created, ok};
use crate::app::errors::{ApiError, OrFail, LOGIN, REGISTRATION};
use crate::app::extract::ApiJson;
use crate::app::services::AppServices;

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let user = services
        .credentials
        .register(&body.email, &body.password)
        .await
        .or_fail(REGISTRATION)?;

    Ok(created(RegisteredResponse {
        message: "User registered successfully",
        user_id: user.id,
    }))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let session = services
        .credentials
        .login(&body.email, &body.password)
        .await
        .or_fail(LOGIN)?;

    Ok(ok(TokenResponse {
        token: session.token,
        expires_at: session.expires_at,
    }))
}

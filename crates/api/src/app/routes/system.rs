use std::sync::Arc;

use axum::{extract::Extension, response::Response};

use saasbill_infra::store::with_deadline;

use crate::app::dto::HealthResponse;
use crate::app::envelope::ok;
use crate::app::errors::{ApiError, OrFail, DATABASE};
use crate::app::services::AppServices;

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Result<Response, ApiError> {
    with_deadline(services.store_timeout, "ping", services.health.ping())
        .await
        .or_fail(DATABASE)?;
    Ok(ok(HealthResponse { status: "healthy" }))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found()
}

use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::Response};

use crate::app::dto::{PageQuery, PlanPath};
use crate::app::envelope::{created, listing, ok};
use crate::app::errors::{
    ApiError, OrFail, INVOICES_FETCH, PLANS_FETCH, SUBSCRIPTION_CREATE, SUBSCRIPTION_FETCH,
};
use crate::app::extract::{ApiPath, ApiQuery};
use crate::app::services::AppServices;
use crate::context::OrgContext;

pub async fn list_plans(Extension(services): Extension<Arc<AppServices>>) -> Result<Response, ApiError> {
    let plans = services.ledger.list_plans().await.or_fail(PLANS_FETCH)?;
    Ok(ok(plans))
}

pub async fn subscribe(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrgContext>,
    ApiPath(PlanPath { plan_id }): ApiPath<PlanPath>,
) -> Result<Response, ApiError> {
    let subscription = services
        .ledger
        .subscribe(org.org_id(), plan_id)
        .await
        .or_fail(SUBSCRIPTION_CREATE)?;
    Ok(created(subscription))
}

pub async fn current_subscription(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrgContext>,
) -> Result<Response, ApiError> {
    let subscription = services
        .ledger
        .active_subscription(org.org_id())
        .await
        .or_fail(SUBSCRIPTION_FETCH)?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "SUBSCRIPTION_NOT_FOUND",
                "No active subscription found",
            )
        })?;
    Ok(ok(subscription))
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrgContext>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Response, ApiError> {
    let page = query.page_request()?;
    let invoices = services
        .ledger
        .list_invoices(org.org_id())
        .await
        .or_fail(INVOICES_FETCH)?;
    Ok(listing(invoices, page))
}

use std::sync::Arc;

use axum::{extract::Extension, response::Response};
use tracing::debug;

use crate::app::dto::{AddMemberRequest, CreateOrganizationRequest, PageQuery};
use crate::app::envelope::{created, listing, ok, Message};
use crate::app::errors::{ApiError, OrFail, MEMBER_ADD, ORGANIZATION_CREATE, ORGANIZATION_FETCH};
use crate::app::extract::{ApiJson, ApiQuery};
use crate::app::services::AppServices;
use crate::context::{OrgContext, UserContext};

pub async fn create_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    ApiJson(body): ApiJson<CreateOrganizationRequest>,
) -> Result<Response, ApiError> {
    let org = services
        .directory
        .create_organization(user.user_id(), &body.name)
        .await
        .or_fail(ORGANIZATION_CREATE)?;
    Ok(created(org))
}

pub async fn list_organizations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Response, ApiError> {
    let page = query.page_request()?;
    let orgs = services
        .directory
        .list_user_organizations(user.user_id())
        .await
        .or_fail(ORGANIZATION_FETCH)?;
    Ok(listing(orgs, page))
}

pub async fn add_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrgContext>,
    ApiJson(body): ApiJson<AddMemberRequest>,
) -> Result<Response, ApiError> {
    debug!(org_id = %org.org_id(), granted_by = %org.role(), role = %body.role, "adding member");
    services
        .directory
        .add_member(org.org_id(), body.user_id, body.role)
        .await
        .or_fail(MEMBER_ADD)?;
    Ok(ok(Message {
        message: "Member added successfully",
    }))
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saasbill_auth::Role;
use saasbill_core::{OrgId, PlanId, UserId};

use crate::app::envelope::PageRequest;
use crate::app::errors::ApiError;

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredResponse {
    pub message: &'static str,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: UserId,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrgPath {
    pub org_id: OrgId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanPath {
    pub plan_id: PlanId,
}

/// Optional `?page=&page_size=` on list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl PageQuery {
    /// `None` when neither parameter is present (unpaginated listing).
    pub fn page_request(self) -> Result<Option<PageRequest>, ApiError> {
        if self.page.is_none() && self.page_size.is_none() {
            return Ok(None);
        }
        PageRequest::new(self.page.unwrap_or(1), self.page_size)
            .map(Some)
            .map_err(ApiError::invalid_request)
    }
}

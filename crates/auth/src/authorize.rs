use async_trait::async_trait;
use thiserror::Error;

use saasbill_core::{OrgId, UserId};

use crate::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("user is not a member of this organization")]
    NotAMember,

    #[error("role '{0}' is not permitted for this action")]
    InsufficientRole(Role),

    #[error("role lookup failed: {0}")]
    Unavailable(String),
}

/// Source of truth for `(user, organization) -> role`.
///
/// Implemented by the organization directory; the HTTP gate only sees this
/// trait so it can be exercised without storage.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    async fn resolve_role(&self, user_id: UserId, org_id: OrgId) -> Result<Role, AuthzError>;
}

/// Pure policy check: `role` must be one of `allowed`.
///
/// - No IO
/// - No hierarchy (owner does not imply admin unless listed)
pub fn authorize_role(role: Role, allowed: &[Role]) -> Result<(), AuthzError> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(AuthzError::InsufficientRole(role))
    }
}

/// Resolve the caller's role in `org_id` and check it against `allowed`.
///
/// Returns the resolved role so callers can attach it to the request context.
pub async fn authorize_member(
    resolver: &dyn RoleResolver,
    user_id: UserId,
    org_id: OrgId,
    allowed: &[Role],
) -> Result<Role, AuthzError> {
    let role = resolver.resolve_role(user_id, org_id).await?;
    authorize_role(role, allowed)?;
    Ok(role)
}

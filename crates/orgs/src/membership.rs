use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saasbill_auth::Role;
use saasbill_core::{DomainError, OrgId, UserId};

/// The `(user, organization)` relation carrying the user's role there.
///
/// At most one membership exists per pair; the store enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub org_id: OrgId,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Membership {
    /// The creator's membership, written together with the organization.
    pub fn owner(user_id: UserId, org_id: OrgId, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            org_id,
            role: Role::Owner,
            created_at,
        }
    }

    /// A membership granted by an existing owner/admin.
    ///
    /// `owner` is reserved for the organization's creator.
    pub fn granted(
        user_id: UserId,
        org_id: OrgId,
        role: Role,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if !role.is_assignable() {
            return Err(DomainError::validation(format!(
                "role '{role}' cannot be assigned (expected admin or member)"
            )));
        }
        Ok(Self {
            user_id,
            org_id,
            role,
            created_at,
        })
    }
}

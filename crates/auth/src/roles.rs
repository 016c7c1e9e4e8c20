use core::str::FromStr;

use serde::{Deserialize, Serialize};

use saasbill_core::DomainError;

/// A member's role within one organization.
///
/// Roles are a closed set; there is no implied hierarchy. Gates list the roles
/// they accept explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

/// Roles allowed to manage members and billing.
pub const OWNER_OR_ADMIN: &[Role] = &[Role::Owner, Role::Admin];

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    /// Whether the role may be granted through "add member".
    ///
    /// `owner` is only ever assigned to an organization's creator.
    pub fn is_assignable(self) -> bool {
        matches!(self, Role::Admin | Role::Member)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(DomainError::validation(format!(
                "unknown role '{other}' (expected owner, admin or member)"
            ))),
        }
    }
}

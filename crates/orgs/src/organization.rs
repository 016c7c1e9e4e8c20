use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saasbill_core::{DomainError, Entity, OrgId};

pub const MAX_ORG_NAME_LEN: usize = 255;

/// A tenant: the unit that owns members and a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    /// Validate and build a new organization. The name is stored trimmed.
    pub fn new(name: &str, created_at: DateTime<Utc>) -> Result<Self, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("organization name is required"));
        }
        if name.chars().count() > MAX_ORG_NAME_LEN {
            return Err(DomainError::validation(format!(
                "organization name must be at most {MAX_ORG_NAME_LEN} characters"
            )));
        }
        Ok(Self {
            id: OrgId::new(),
            name: name.to_string(),
            created_at,
        })
    }
}

impl Entity for Organization {
    type Id = OrgId;

    fn id(&self) -> OrgId {
        self.id
    }
}

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use saasbill_core::{DomainError, Entity, PlanId};

/// Billing interval of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanInterval {
    Month,
    Year,
}

impl PlanInterval {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanInterval::Month => "month",
            PlanInterval::Year => "year",
        }
    }

    /// End of the billing period starting at `start`.
    ///
    /// Calendar arithmetic: the day of month is clamped to the target month's
    /// last day (Jan 31 + 1 month = Feb 28/29).
    pub fn period_end(self, start: DateTime<Utc>) -> Result<DateTime<Utc>, DomainError> {
        let months = match self {
            PlanInterval::Month => Months::new(1),
            PlanInterval::Year => Months::new(12),
        };
        start
            .checked_add_months(months)
            .ok_or_else(|| DomainError::invariant("billing period end is out of range"))
    }
}

impl core::fmt::Display for PlanInterval {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PlanInterval {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "month" => Ok(PlanInterval::Month),
            "year" => Ok(PlanInterval::Year),
            other => Err(DomainError::validation(format!(
                "unknown billing interval '{other}' (expected month or year)"
            ))),
        }
    }
}

/// Catalog entry. Prices are in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub description: String,
    pub price_cents: u64,
    pub interval: PlanInterval,
    pub created_at: DateTime<Utc>,
}

impl Entity for Plan {
    type Id = PlanId;

    fn id(&self) -> PlanId {
        self.id
    }
}

/// Administrative input for adding a plan to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlan {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: u64,
    pub interval: PlanInterval,
}

impl NewPlan {
    pub fn into_plan(self, created_at: DateTime<Utc>) -> Result<Plan, DomainError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("plan name is required"));
        }
        // Stored as BIGINT.
        if i64::try_from(self.price_cents).is_err() {
            return Err(DomainError::validation("plan price is too large"));
        }
        Ok(Plan {
            id: PlanId::new(),
            name: name.to_string(),
            description: self.description.trim().to_string(),
            price_cents: self.price_cents,
            interval: self.interval,
            created_at,
        })
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saasbill_core::{DomainError, Entity, OrgId, PlanId, SubscriptionId};

use crate::{Invoice, Plan};

/// Subscription lifecycle.
///
/// Only `active` is ever written; the other states exist so rows written by
/// other tooling can still be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::PastDue => "past_due",
        }
    }
}

impl core::str::FromStr for SubscriptionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            other => Err(DomainError::validation(format!("unknown subscription status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub org_id: OrgId,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Subscription {
    type Id = SubscriptionId;

    fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// The two rows written together when an organization subscribes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedSubscription {
    pub subscription: Subscription,
    pub invoice: Invoice,
}

impl Subscription {
    /// Open an active subscription to `plan` at `now`, with its first invoice.
    ///
    /// The invoice charges the plan's current price, is unpaid and due
    /// immediately.
    pub fn open(org_id: OrgId, plan: &Plan, now: DateTime<Utc>) -> Result<OpenedSubscription, DomainError> {
        let current_period_end = plan.interval.period_end(now)?;
        let subscription = Subscription {
            id: SubscriptionId::new(),
            org_id,
            plan_id: plan.id,
            status: SubscriptionStatus::Active,
            current_period_start: now,
            current_period_end,
            created_at: now,
        };
        let invoice = Invoice::opening(&subscription, plan.price_cents, now);
        Ok(OpenedSubscription { subscription, invoice })
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saasbill_core::{DomainError, Entity, InvoiceId, SubscriptionId};

use crate::Subscription;

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Unpaid,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::Paid => "paid",
        }
    }
}

impl core::str::FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(InvoiceStatus::Unpaid),
            "paid" => Ok(InvoiceStatus::Paid),
            other => Err(DomainError::validation(format!("unknown invoice status '{other}'"))),
        }
    }
}

/// A bill for one subscription period. Amounts are in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub subscription_id: SubscriptionId,
    pub amount_cents: u64,
    pub status: InvoiceStatus,
    pub due_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// First invoice of a subscription: full price, unpaid, due now.
    pub(crate) fn opening(subscription: &Subscription, amount_cents: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: InvoiceId::new(),
            subscription_id: subscription.id,
            amount_cents,
            status: InvoiceStatus::Unpaid,
            due_date: now,
            paid_at: None,
            created_at: now,
        }
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> InvoiceId {
        self.id
    }
}

//! Storage abstractions for users, organizations and billing.
//!
//! Every multi-row write that must be all-or-nothing is a single trait method
//! so each backend can make it atomic in its own way (one lock for the
//! in-memory store, one transaction for PostgreSQL).

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use saasbill_auth::{Role, User};
use saasbill_billing::{Invoice, OpenedSubscription, Plan, Subscription};
use saasbill_core::{OrgId, PlanId, UserId};
use saasbill_orgs::{Membership, Organization};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// The kind of record a store error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    User,
    Organization,
    Membership,
    Plan,
    Subscription,
    Invoice,
}

impl core::fmt::Display for Record {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Record::User => "user",
            Record::Organization => "organization",
            Record::Membership => "membership",
            Record::Plan => "plan",
            Record::Subscription => "subscription",
            Record::Invoice => "invoice",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(Record),

    #[error("{0} already exists")]
    Conflict(Record),

    #[error("store call '{0}' timed out")]
    Timeout(&'static str),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict(User)` when the email is already registered.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Lookup by normalized email.
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Atomically write the organization and its owner membership.
    async fn create_organization(&self, org: &Organization, owner: &Membership) -> Result<(), StoreError>;

    /// Organizations the user belongs to, oldest first.
    async fn organizations_for_user(&self, user_id: UserId) -> Result<Vec<Organization>, StoreError>;

    /// Fails with `NotFound(Organization)`, `NotFound(User)` or
    /// `Conflict(Membership)`.
    async fn insert_membership(&self, membership: &Membership) -> Result<(), StoreError>;

    async fn membership_role(&self, user_id: UserId, org_id: OrgId) -> Result<Option<Role>, StoreError>;
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn insert_plan(&self, plan: &Plan) -> Result<(), StoreError>;

    /// All plans, cheapest first.
    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError>;

    /// Atomically open a subscription for `org_id` on `plan_id` at `now` and
    /// write its opening invoice.
    ///
    /// Reads the plan inside the same unit of work so the invoice charges the
    /// price current at that moment. Fails with `NotFound(Plan)`,
    /// `NotFound(Organization)` or, when the organization already has an active
    /// subscription, `Conflict(Subscription)`. Nothing is written on failure.
    async fn open_subscription(
        &self,
        org_id: OrgId,
        plan_id: PlanId,
        now: DateTime<Utc>,
    ) -> Result<OpenedSubscription, StoreError>;

    async fn active_subscription(&self, org_id: OrgId) -> Result<Option<Subscription>, StoreError>;

    /// Invoices across all of the organization's subscriptions, newest first.
    async fn invoices_for_org(&self, org_id: OrgId) -> Result<Vec<Invoice>, StoreError>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
}

/// A backend implementing every store concern.
pub trait Store: UserStore + OrganizationStore + BillingStore + StoreHealth {}

impl<T> Store for T where T: UserStore + OrganizationStore + BillingStore + StoreHealth {}

/// Bound a store call by `timeout`, mapping expiry to `StoreError::Timeout(op)`.
pub async fn with_deadline<T, F>(timeout: Duration, op: &'static str, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation = op, timeout_ms = timeout.as_millis() as u64, "store call timed out");
            Err(StoreError::Timeout(op))
        }
    }
}

//! PostgreSQL-backed store.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | Constraint | StoreError |
//! |----------------------|------------|------------|
//! | `23505` unique violation | `users_email_key` | `Conflict(User)` |
//! | `23505` unique violation | `memberships_pkey` | `Conflict(Membership)` |
//! | `23505` unique violation | `subscriptions_one_active_per_org` | `Conflict(Subscription)` |
//! | `23503` foreign key violation | `*_user_id_fkey` | `NotFound(User)` |
//! | `23503` foreign key violation | `*_org_id_fkey` | `NotFound(Organization)` |
//! | `23503` foreign key violation | `*_plan_id_fkey` | `NotFound(Plan)` |
//! | PoolTimedOut / PoolClosed / Io | N/A | `Unavailable` |
//! | anything else | N/A | `Backend` |
//!
//! Multi-row writes run in one transaction; an early return drops the
//! transaction, which rolls it back.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use async_trait::async_trait;

use saasbill_auth::{Role, User};
use saasbill_billing::{Invoice, OpenedSubscription, Plan, Subscription};
use saasbill_core::{DomainError, OrgId, PlanId, UserId};
use saasbill_orgs::{Membership, Organization};

use super::{BillingStore, OrganizationStore, Record, StoreError, StoreHealth, UserStore};

const SCHEMA: &str = include_str!("schema.sql");

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool to `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema (idempotent).
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(())
    }

    #[instrument(skip(self, email), err)]
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("user_by_email", e))?;

        row.map(|r| decode::<UserRow>(&r).map(User::from)).transpose()
    }
}

#[async_trait]
impl OrganizationStore for PostgresStore {
    #[instrument(skip(self, org, owner), fields(org_id = %org.id, user_id = %owner.user_id), err)]
    async fn create_organization(&self, org: &Organization, owner: &Membership) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("INSERT INTO organizations (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(org.id.as_uuid())
            .bind(&org.name)
            .bind(org.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_organization", e))?;

        insert_membership_row(&mut *tx, owner).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn organizations_for_user(&self, user_id: UserId) -> Result<Vec<Organization>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT o.id, o.name, o.created_at
            FROM organizations o
            JOIN memberships m ON m.org_id = o.id
            WHERE m.user_id = $1
            ORDER BY o.created_at ASC, o.id ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("organizations_for_user", e))?;

        rows.iter()
            .map(|r| decode::<OrganizationRow>(r).map(Organization::from))
            .collect()
    }

    #[instrument(
        skip(self, membership),
        fields(org_id = %membership.org_id, user_id = %membership.user_id, role = %membership.role),
        err
    )]
    async fn insert_membership(&self, membership: &Membership) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        insert_membership_row(&mut *conn, membership).await
    }

    #[instrument(skip(self), fields(user_id = %user_id, org_id = %org_id), err)]
    async fn membership_role(&self, user_id: UserId, org_id: OrgId) -> Result<Option<Role>, StoreError> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM memberships WHERE user_id = $1 AND org_id = $2")
            .bind(user_id.as_uuid())
            .bind(org_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("membership_role", e))?;

        role.map(|r| r.parse::<Role>().map_err(|e| StoreError::Backend(e.to_string())))
            .transpose()
    }
}

#[async_trait]
impl BillingStore for PostgresStore {
    #[instrument(skip(self, plan), fields(plan_id = %plan.id), err)]
    async fn insert_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO plans (id, name, description, price_cents, billing_interval, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(plan.id.as_uuid())
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(to_db_cents(plan.price_cents)?)
        .bind(plan.interval.as_str())
        .bind(plan.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_plan", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, price_cents, billing_interval, created_at
            FROM plans
            ORDER BY price_cents ASC, created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_plans", e))?;

        rows.iter().map(|r| Plan::try_from(decode::<PlanRow>(r)?)).collect()
    }

    #[instrument(skip(self, now), fields(org_id = %org_id, plan_id = %plan_id), err)]
    async fn open_subscription(
        &self,
        org_id: OrgId,
        plan_id: PlanId,
        now: DateTime<Utc>,
    ) -> Result<OpenedSubscription, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let plan_row = sqlx::query(
            r#"
            SELECT id, name, description, price_cents, billing_interval, created_at
            FROM plans
            WHERE id = $1
            "#,
        )
        .bind(plan_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_plan", e))?
        .ok_or(StoreError::NotFound(Record::Plan))?;
        let plan = Plan::try_from(decode::<PlanRow>(&plan_row)?)?;

        // Row lock serializes concurrent subscribes for one organization.
        let org_exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM organizations WHERE id = $1 FOR UPDATE")
            .bind(org_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_organization", e))?;
        if org_exists.is_none() {
            return Err(StoreError::NotFound(Record::Organization));
        }

        let active: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM subscriptions WHERE org_id = $1 AND status = 'active' LIMIT 1",
        )
        .bind(org_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("find_active_subscription", e))?;
        if active.is_some() {
            return Err(StoreError::Conflict(Record::Subscription));
        }

        let opened = Subscription::open(org_id, &plan, now).map_err(|e| StoreError::Backend(e.to_string()))?;
        let sub = &opened.subscription;
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, org_id, plan_id, status, current_period_start, current_period_end, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(sub.id.as_uuid())
        .bind(sub.org_id.as_uuid())
        .bind(sub.plan_id.as_uuid())
        .bind(sub.status.as_str())
        .bind(sub.current_period_start)
        .bind(sub.current_period_end)
        .bind(sub.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_subscription", e))?;

        let inv = &opened.invoice;
        sqlx::query(
            r#"
            INSERT INTO invoices (id, subscription_id, amount_cents, status, due_date, paid_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(inv.id.as_uuid())
        .bind(inv.subscription_id.as_uuid())
        .bind(to_db_cents(inv.amount_cents)?)
        .bind(inv.status.as_str())
        .bind(inv.due_date)
        .bind(inv.paid_at)
        .bind(inv.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(opened)
    }

    #[instrument(skip(self), fields(org_id = %org_id), err)]
    async fn active_subscription(&self, org_id: OrgId) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, org_id, plan_id, status, current_period_start, current_period_end, created_at
            FROM subscriptions
            WHERE org_id = $1 AND status = 'active'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(org_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_subscription", e))?;

        row.map(|r| Subscription::try_from(decode::<SubscriptionRow>(&r)?))
            .transpose()
    }

    #[instrument(skip(self), fields(org_id = %org_id), err)]
    async fn invoices_for_org(&self, org_id: OrgId) -> Result<Vec<Invoice>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.subscription_id, i.amount_cents, i.status,
                   i.due_date, i.paid_at, i.created_at
            FROM invoices i
            JOIN subscriptions s ON s.id = i.subscription_id
            WHERE s.org_id = $1
            ORDER BY i.created_at DESC, i.id DESC
            "#,
        )
        .bind(org_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("invoices_for_org", e))?;

        rows.iter().map(|r| Invoice::try_from(decode::<InvoiceRow>(r)?)).collect()
    }
}

#[async_trait]
impl StoreHealth for PostgresStore {
    #[instrument(skip(self), err)]
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }
}

async fn insert_membership_row(conn: &mut sqlx::PgConnection, membership: &Membership) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO memberships (user_id, org_id, role, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(membership.user_id.as_uuid())
    .bind(membership.org_id.as_uuid())
    .bind(membership.role.as_str())
    .bind(membership.created_at)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("insert_membership", e))?;
    Ok(())
}

fn to_db_cents(cents: u64) -> Result<i64, StoreError> {
    i64::try_from(cents).map_err(|_| StoreError::Backend(format!("amount {cents} exceeds BIGINT")))
}

fn from_db_cents(cents: i64) -> Result<u64, StoreError> {
    u64::try_from(cents).map_err(|_| StoreError::Backend(format!("negative amount {cents} in store")))
}

fn decode<'r, T>(row: &'r PgRow) -> Result<T, StoreError>
where
    T: FromRow<'r, PgRow>,
{
    T::from_row(row).map_err(|e| StoreError::Backend(format!("failed to decode row: {e}")))
}

/// Map sqlx errors to `StoreError` (see the module docs for the table).
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            match db_err.code().as_deref() {
                Some("23505") => {
                    if constraint.starts_with("memberships") {
                        StoreError::Conflict(Record::Membership)
                    } else if constraint.starts_with("subscriptions") {
                        StoreError::Conflict(Record::Subscription)
                    } else if constraint.starts_with("users") {
                        StoreError::Conflict(Record::User)
                    } else {
                        StoreError::Backend(format!("unique violation in {operation}: {}", db_err.message()))
                    }
                }
                Some("23503") => {
                    if constraint.ends_with("user_id_fkey") {
                        StoreError::NotFound(Record::User)
                    } else if constraint.ends_with("org_id_fkey") {
                        StoreError::NotFound(Record::Organization)
                    } else if constraint.ends_with("plan_id_fkey") {
                        StoreError::NotFound(Record::Plan)
                    } else {
                        StoreError::Backend(format!("foreign key violation in {operation}: {}", db_err.message()))
                    }
                }
                _ => StoreError::Backend(format!("database error in {operation}: {}", db_err.message())),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(format!("{operation}: {err}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

// SQLx row types

#[derive(Debug)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::from_uuid(row.id),
            email: row.email,
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug)]
struct OrganizationRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for OrganizationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrganizationRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Organization {
            id: OrgId::from_uuid(row.id),
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug)]
struct PlanRow {
    id: Uuid,
    name: String,
    description: String,
    price_cents: i64,
    billing_interval: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for PlanRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PlanRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price_cents: row.try_get("price_cents")?,
            billing_interval: row.try_get("billing_interval")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<PlanRow> for Plan {
    type Error = StoreError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        Ok(Plan {
            id: PlanId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            price_cents: from_db_cents(row.price_cents)?,
            interval: row
                .billing_interval
                .parse()
                .map_err(|e: DomainError| StoreError::Backend(e.to_string()))?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct SubscriptionRow {
    id: Uuid,
    org_id: Uuid,
    plan_id: Uuid,
    status: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SubscriptionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SubscriptionRow {
            id: row.try_get("id")?,
            org_id: row.try_get("org_id")?,
            plan_id: row.try_get("plan_id")?,
            status: row.try_get("status")?,
            current_period_start: row.try_get("current_period_start")?,
            current_period_end: row.try_get("current_period_end")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: row.id.into(),
            org_id: OrgId::from_uuid(row.org_id),
            plan_id: PlanId::from_uuid(row.plan_id),
            status: row
                .status
                .parse()
                .map_err(|e: DomainError| StoreError::Backend(e.to_string()))?,
            current_period_start: row.current_period_start,
            current_period_end: row.current_period_end,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct InvoiceRow {
    id: Uuid,
    subscription_id: Uuid,
    amount_cents: i64,
    status: String,
    due_date: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for InvoiceRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(InvoiceRow {
            id: row.try_get("id")?,
            subscription_id: row.try_get("subscription_id")?,
            amount_cents: row.try_get("amount_cents")?,
            status: row.try_get("status")?,
            due_date: row.try_get("due_date")?,
            paid_at: row.try_get("paid_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = StoreError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: row.id.into(),
            subscription_id: row.subscription_id.into(),
            amount_cents: from_db_cents(row.amount_cents)?,
            status: row
                .status
                .parse()
                .map_err(|e: DomainError| StoreError::Backend(e.to_string()))?,
            due_date: row.due_date,
            paid_at: row.paid_at,
            created_at: row.created_at,
        })
    }
}

//! Plan catalog, subscriptions and their invoices.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use saasbill_billing::{Invoice, NewPlan, Plan, Subscription};
use saasbill_core::{DomainError, OrgId, PlanId};

use crate::store::{BillingStore, Record, StoreError, with_deadline};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    InvalidInput(#[from] DomainError),

    #[error("plan not found")]
    PlanNotFound,

    #[error("organization not found")]
    OrgNotFound,

    #[error("organization already has an active subscription")]
    AlreadySubscribed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn classify(err: StoreError) -> LedgerError {
    match err {
        StoreError::NotFound(Record::Plan) => LedgerError::PlanNotFound,
        StoreError::NotFound(Record::Organization) => LedgerError::OrgNotFound,
        StoreError::Conflict(Record::Subscription) => LedgerError::AlreadySubscribed,
        other => LedgerError::Store(other),
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read plan catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("plan catalog {path} is not a JSON array of plans: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Read a JSON array of plans, e.g.
/// `[{"name":"Pro","description":"...","price_cents":2900,"interval":"month"}]`.
pub fn read_plan_catalog(path: &Path) -> Result<Vec<NewPlan>, CatalogError> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CatalogError::Parse { path: display, source })
}

/// Plans, subscriptions and invoices.
#[derive(Clone)]
pub struct SubscriptionLedger {
    billing: Arc<dyn BillingStore>,
    timeout: Duration,
}

impl SubscriptionLedger {
    pub fn new(billing: Arc<dyn BillingStore>, timeout: Duration) -> Self {
        Self { billing, timeout }
    }

    /// Add a plan to the catalog (administrative; not exposed over HTTP).
    pub async fn create_plan(&self, input: NewPlan) -> Result<Plan, LedgerError> {
        let plan = input.into_plan(Utc::now())?;
        with_deadline(self.timeout, "insert_plan", self.billing.insert_plan(&plan))
            .await
            .map_err(classify)?;
        info!(plan_id = %plan.id, name = %plan.name, price_cents = plan.price_cents, "plan created");
        Ok(plan)
    }

    /// Insert `plans` only when the catalog is empty. Returns how many were added.
    pub async fn seed_plans(&self, plans: Vec<NewPlan>) -> Result<usize, LedgerError> {
        if !self.list_plans().await?.is_empty() {
            return Ok(0);
        }
        let mut added = 0;
        for plan in plans {
            self.create_plan(plan).await?;
            added += 1;
        }
        Ok(added)
    }

    pub async fn list_plans(&self) -> Result<Vec<Plan>, LedgerError> {
        with_deadline(self.timeout, "list_plans", self.billing.list_plans())
            .await
            .map_err(classify)
    }

    /// Subscribe `org_id` to `plan_id`, billing the plan's current price.
    ///
    /// The subscription and its opening invoice are written atomically.
    pub async fn subscribe(&self, org_id: OrgId, plan_id: PlanId) -> Result<Subscription, LedgerError> {
        let opened = with_deadline(
            self.timeout,
            "open_subscription",
            self.billing.open_subscription(org_id, plan_id, Utc::now()),
        )
        .await
        .map_err(classify)?;

        info!(
            org_id = %org_id,
            plan_id = %plan_id,
            subscription_id = %opened.subscription.id,
            invoice_id = %opened.invoice.id,
            amount_cents = opened.invoice.amount_cents,
            "subscription opened"
        );
        Ok(opened.subscription)
    }

    /// The organization's active subscription; `None` when it has none.
    pub async fn active_subscription(&self, org_id: OrgId) -> Result<Option<Subscription>, LedgerError> {
        with_deadline(self.timeout, "active_subscription", self.billing.active_subscription(org_id))
            .await
            .map_err(classify)
    }

    pub async fn list_invoices(&self, org_id: OrgId) -> Result<Vec<Invoice>, LedgerError> {
        with_deadline(self.timeout, "invoices_for_org", self.billing.invoices_for_org(org_id))
            .await
            .map_err(classify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, OrganizationStore};
    use saasbill_billing::{InvoiceStatus, PlanInterval, SubscriptionStatus};
    use saasbill_core::UserId;
    use saasbill_orgs::{Membership, Organization};
    use std::io::Write;

    fn pro(price_cents: u64) -> NewPlan {
        NewPlan {
            name: "Pro".into(),
            description: "For teams".into(),
            price_cents,
            interval: PlanInterval::Month,
        }
    }

    async fn org(store: &InMemoryStore) -> OrgId {
        use crate::store::UserStore;
        let owner = saasbill_auth::User::new("o@x.io".into(), "$argon2id$stub".into(), Utc::now());
        store.insert_user(&owner).await.unwrap();
        let org = Organization::new("Acme", Utc::now()).unwrap();
        store
            .create_organization(&org, &Membership::owner(owner.id, org.id, Utc::now()))
            .await
            .unwrap();
        org.id
    }

    fn ledger(store: &Arc<InMemoryStore>) -> SubscriptionLedger {
        SubscriptionLedger::new(store.clone(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn subscribe_bills_the_plan_price_once() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ledger(&store);
        let org_id = org(&store).await;
        let plan = ledger.create_plan(pro(2_900)).await.unwrap();

        let sub = ledger.subscribe(org_id, plan.id).await.unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.plan_id, plan.id);
        assert!(sub.current_period_end > sub.current_period_start);

        let invoices = ledger.list_invoices(org_id).await.unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].amount_cents, 2_900);
        assert_eq!(invoices[0].status, InvoiceStatus::Unpaid);
        assert_eq!(invoices[0].subscription_id, sub.id);
        assert_eq!(ledger.active_subscription(org_id).await.unwrap(), Some(sub));
    }

    #[tokio::test]
    async fn subscribe_errors_are_classified() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ledger(&store);
        let org_id = org(&store).await;
        let plan = ledger.create_plan(pro(100)).await.unwrap();

        assert_eq!(ledger.subscribe(org_id, PlanId::new()).await, Err(LedgerError::PlanNotFound));
        assert_eq!(ledger.subscribe(OrgId::new(), plan.id).await, Err(LedgerError::OrgNotFound));

        ledger.subscribe(org_id, plan.id).await.unwrap();
        assert_eq!(ledger.subscribe(org_id, plan.id).await, Err(LedgerError::AlreadySubscribed));
        assert_eq!(ledger.list_invoices(org_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_subscription_is_not_an_error() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ledger(&store);
        let org_id = org(&store).await;
        assert_eq!(ledger.active_subscription(org_id).await, Ok(None));
        assert_eq!(ledger.list_invoices(org_id).await, Ok(vec![]));
        assert_eq!(ledger.active_subscription(OrgId::new()).await, Ok(None));
    }

    #[tokio::test]
    async fn seeding_only_fills_an_empty_catalog() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ledger(&store);
        assert_eq!(ledger.seed_plans(vec![pro(100), pro(200)]).await, Ok(2));
        assert_eq!(ledger.seed_plans(vec![pro(300)]).await, Ok(0));
        assert_eq!(ledger.list_plans().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn blank_plan_name_is_invalid_input() {
        let store = Arc::new(InMemoryStore::new());
        let mut input = pro(100);
        input.name = " ".into();
        assert!(matches!(
            ledger(&store).create_plan(input).await,
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn catalog_file_is_parsed() {
        let path = std::env::temp_dir().join(format!("plans-{}.json", UserId::new()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"name":"Starter","price_cents":900,"interval":"month"}},
               {{"name":"Pro","description":"Annual","price_cents":29000,"interval":"year"}}]"#
        )
        .unwrap();

        let plans = read_plan_catalog(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].description, "");
        assert_eq!(plans[1].interval, PlanInterval::Year);
    }

    #[test]
    fn missing_catalog_file_is_an_io_error() {
        let err = read_plan_catalog(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }
}

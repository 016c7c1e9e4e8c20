//! In-memory store for tests/dev.
//!
//! All tables sit behind one `RwLock`, so each trait method (including the
//! multi-row writes) observes and produces a consistent snapshot.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use saasbill_auth::{Role, User};
use saasbill_billing::{Invoice, OpenedSubscription, Plan, Subscription};
use saasbill_core::{Entity, OrgId, PlanId, UserId};
use saasbill_orgs::{Membership, Organization};

use super::{BillingStore, OrganizationStore, Record, StoreError, StoreHealth, UserStore};

/// Rows of one entity type keyed by their id.
#[derive(Debug)]
struct Table<E: Entity> {
    rows: HashMap<E::Id, E>,
}

impl<E: Entity + Clone> Table<E> {
    fn new() -> Self {
        Self { rows: HashMap::new() }
    }

    fn contains(&self, id: E::Id) -> bool {
        self.rows.contains_key(&id)
    }

    fn get(&self, id: E::Id) -> Option<&E> {
        self.rows.get(&id)
    }

    fn insert(&mut self, row: E) {
        self.rows.insert(row.id(), row);
    }

    fn values(&self) -> impl Iterator<Item = &E> {
        self.rows.values()
    }
}

#[derive(Debug)]
struct State {
    users: Table<User>,
    users_by_email: HashMap<String, UserId>,
    organizations: Table<Organization>,
    memberships: HashMap<(UserId, OrgId), Membership>,
    plans: Table<Plan>,
    subscriptions: Table<Subscription>,
    invoices: Table<Invoice>,
}

#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                users: Table::new(),
                users_by_email: HashMap::new(),
                organizations: Table::new(),
                memberships: HashMap::new(),
                plans: Table::new(),
                subscriptions: Table::new(),
                invoices: Table::new(),
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.users_by_email.contains_key(&user.email) || state.users.contains(user.id) {
            return Err(StoreError::Conflict(Record::User));
        }
        state.users_by_email.insert(user.email.clone(), user.id);
        state.users.insert(user.clone());
        Ok(())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = self.read()?;
        Ok(state
            .users_by_email
            .get(email)
            .and_then(|id| state.users.get(*id))
            .cloned())
    }
}

#[async_trait]
impl OrganizationStore for InMemoryStore {
    async fn create_organization(&self, org: &Organization, owner: &Membership) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.organizations.contains(org.id) {
            return Err(StoreError::Conflict(Record::Organization));
        }
        if !state.users.contains(owner.user_id) {
            return Err(StoreError::NotFound(Record::User));
        }
        state.organizations.insert(org.clone());
        state.memberships.insert((owner.user_id, owner.org_id), owner.clone());
        Ok(())
    }

    async fn organizations_for_user(&self, user_id: UserId) -> Result<Vec<Organization>, StoreError> {
        let state = self.read()?;
        let mut orgs: Vec<Organization> = state
            .memberships
            .keys()
            .filter(|(member, _)| *member == user_id)
            .filter_map(|(_, org_id)| state.organizations.get(*org_id).cloned())
            .collect();
        orgs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(orgs)
    }

    async fn insert_membership(&self, membership: &Membership) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.organizations.contains(membership.org_id) {
            return Err(StoreError::NotFound(Record::Organization));
        }
        if !state.users.contains(membership.user_id) {
            return Err(StoreError::NotFound(Record::User));
        }
        let key = (membership.user_id, membership.org_id);
        if state.memberships.contains_key(&key) {
            return Err(StoreError::Conflict(Record::Membership));
        }
        state.memberships.insert(key, membership.clone());
        Ok(())
    }

    async fn membership_role(&self, user_id: UserId, org_id: OrgId) -> Result<Option<Role>, StoreError> {
        let state = self.read()?;
        Ok(state.memberships.get(&(user_id, org_id)).map(|m| m.role))
    }
}

#[async_trait]
impl BillingStore for InMemoryStore {
    async fn insert_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.plans.contains(plan.id) {
            return Err(StoreError::Conflict(Record::Plan));
        }
        state.plans.insert(plan.clone());
        Ok(())
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        let state = self.read()?;
        let mut plans: Vec<Plan> = state.plans.values().cloned().collect();
        plans.sort_by(|a, b| {
            a.price_cents
                .cmp(&b.price_cents)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(plans)
    }

    async fn open_subscription(
        &self,
        org_id: OrgId,
        plan_id: PlanId,
        now: DateTime<Utc>,
    ) -> Result<OpenedSubscription, StoreError> {
        let mut state = self.write()?;
        let plan = state.plans.get(plan_id).ok_or(StoreError::NotFound(Record::Plan))?;
        if !state.organizations.contains(org_id) {
            return Err(StoreError::NotFound(Record::Organization));
        }
        if state.subscriptions.values().any(|s| s.org_id == org_id && s.is_active()) {
            return Err(StoreError::Conflict(Record::Subscription));
        }

        let opened = Subscription::open(org_id, plan, now).map_err(|e| StoreError::Backend(e.to_string()))?;
        state.subscriptions.insert(opened.subscription.clone());
        state.invoices.insert(opened.invoice.clone());
        Ok(opened)
    }

    async fn active_subscription(&self, org_id: OrgId) -> Result<Option<Subscription>, StoreError> {
        let state = self.read()?;
        Ok(state
            .subscriptions
            .values()
            .filter(|s| s.org_id == org_id && s.is_active())
            .max_by_key(|s| (s.created_at, s.id))
            .cloned())
    }

    async fn invoices_for_org(&self, org_id: OrgId) -> Result<Vec<Invoice>, StoreError> {
        let state = self.read()?;
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|inv| {
                state
                    .subscriptions
                    .get(inv.subscription_id)
                    .is_some_and(|s| s.org_id == org_id)
            })
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(invoices)
    }
}

#[async_trait]
impl StoreHealth for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }
}

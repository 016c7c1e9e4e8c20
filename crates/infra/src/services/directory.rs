//! Organizations, their members and the role each member holds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::info;

use saasbill_auth::{AuthzError, Role, RoleResolver};
use saasbill_core::{DomainError, OrgId, UserId};
use saasbill_orgs::{Membership, Organization};

use crate::store::{OrganizationStore, Record, StoreError, with_deadline};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error(transparent)]
    InvalidInput(#[from] DomainError),

    #[error("organization not found")]
    OrgNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("user is already a member of this organization")]
    DuplicateMembership,

    #[error("user is not a member of this organization")]
    NotAMember,

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn classify(err: StoreError) -> DirectoryError {
    match err {
        StoreError::NotFound(Record::Organization) => DirectoryError::OrgNotFound,
        StoreError::NotFound(Record::User) => DirectoryError::UserNotFound,
        StoreError::Conflict(Record::Membership) => DirectoryError::DuplicateMembership,
        other => DirectoryError::Store(other),
    }
}

/// Organizations, memberships and the role lookup behind the authorization gate.
#[derive(Clone)]
pub struct OrganizationDirectory {
    orgs: Arc<dyn OrganizationStore>,
    timeout: Duration,
}

impl OrganizationDirectory {
    pub fn new(orgs: Arc<dyn OrganizationStore>, timeout: Duration) -> Self {
        Self { orgs, timeout }
    }

    /// Create an organization with `owner` as its first member (role `owner`).
    pub async fn create_organization(&self, owner: UserId, name: &str) -> Result<Organization, DirectoryError> {
        let now = Utc::now();
        let org = Organization::new(name, now)?;
        let membership = Membership::owner(owner, org.id, now);

        with_deadline(
            self.timeout,
            "create_organization",
            self.orgs.create_organization(&org, &membership),
        )
        .await
        .map_err(classify)?;

        info!(org_id = %org.id, owner_id = %owner, "organization created");
        Ok(org)
    }

    pub async fn list_user_organizations(&self, user_id: UserId) -> Result<Vec<Organization>, DirectoryError> {
        with_deadline(
            self.timeout,
            "organizations_for_user",
            self.orgs.organizations_for_user(user_id),
        )
        .await
        .map_err(classify)
    }

    /// Grant `role` (admin or member) in `org_id` to an existing user.
    pub async fn add_member(&self, org_id: OrgId, user_id: UserId, role: Role) -> Result<Membership, DirectoryError> {
        let membership = Membership::granted(user_id, org_id, role, Utc::now())?;

        with_deadline(self.timeout, "insert_membership", self.orgs.insert_membership(&membership))
            .await
            .map_err(classify)?;

        info!(org_id = %org_id, user_id = %user_id, role = %role, "member added");
        Ok(membership)
    }

    pub async fn resolve_role(&self, user_id: UserId, org_id: OrgId) -> Result<Role, DirectoryError> {
        with_deadline(self.timeout, "membership_role", self.orgs.membership_role(user_id, org_id))
            .await
            .map_err(classify)?
            .ok_or(DirectoryError::NotAMember)
    }
}

#[async_trait]
impl RoleResolver for OrganizationDirectory {
    async fn resolve_role(&self, user_id: UserId, org_id: OrgId) -> Result<Role, AuthzError> {
        match OrganizationDirectory::resolve_role(self, user_id, org_id).await {
            Ok(role) => Ok(role),
            Err(DirectoryError::NotAMember) => Err(AuthzError::NotAMember),
            Err(other) => Err(AuthzError::Unavailable(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, UserStore};
    use saasbill_auth::User;

    struct Fixture {
        store: Arc<InMemoryStore>,
        directory: OrganizationDirectory,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let directory = OrganizationDirectory::new(store.clone(), Duration::from_secs(5));
        Fixture { store, directory }
    }

    async fn user(store: &InMemoryStore, email: &str) -> UserId {
        let user = User::new(email.into(), "$argon2id$stub".into(), Utc::now());
        store.insert_user(&user).await.unwrap();
        user.id
    }

    #[tokio::test]
    async fn creator_is_owner_and_sees_the_org() {
        let f = fixture();
        let alice = user(&f.store, "alice@x.io").await;

        let org = f.directory.create_organization(alice, "Acme").await.unwrap();
        assert_eq!(f.directory.resolve_role(alice, org.id).await, Ok(Role::Owner));
        assert_eq!(f.directory.list_user_organizations(alice).await.unwrap(), vec![org]);
    }

    #[tokio::test]
    async fn blank_org_name_is_invalid_input() {
        let f = fixture();
        let alice = user(&f.store, "alice@x.io").await;
        assert!(matches!(
            f.directory.create_organization(alice, "   ").await,
            Err(DirectoryError::InvalidInput(_))
        ));
        assert!(f.directory.list_user_organizations(alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_member_grants_the_requested_role_once() {
        let f = fixture();
        let alice = user(&f.store, "alice@x.io").await;
        let bob = user(&f.store, "bob@x.io").await;
        let org = f.directory.create_organization(alice, "Acme").await.unwrap();

        f.directory.add_member(org.id, bob, Role::Member).await.unwrap();
        assert_eq!(f.directory.resolve_role(bob, org.id).await, Ok(Role::Member));
        assert_eq!(
            f.directory.add_member(org.id, bob, Role::Admin).await,
            Err(DirectoryError::DuplicateMembership)
        );
    }

    #[tokio::test]
    async fn add_member_rejects_unknown_ids_and_owner_role() {
        let f = fixture();
        let alice = user(&f.store, "alice@x.io").await;
        let bob = user(&f.store, "bob@x.io").await;
        let org = f.directory.create_organization(alice, "Acme").await.unwrap();

        assert_eq!(
            f.directory.add_member(org.id, UserId::new(), Role::Member).await,
            Err(DirectoryError::UserNotFound)
        );
        assert_eq!(
            f.directory.add_member(OrgId::new(), bob, Role::Member).await,
            Err(DirectoryError::OrgNotFound)
        );
        assert!(matches!(
            f.directory.add_member(org.id, bob, Role::Owner).await,
            Err(DirectoryError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn outsider_is_not_a_member() {
        let f = fixture();
        let alice = user(&f.store, "alice@x.io").await;
        let org = f.directory.create_organization(alice, "Acme").await.unwrap();

        let outsider = UserId::new();
        assert_eq!(f.directory.resolve_role(outsider, org.id).await, Err(DirectoryError::NotAMember));
        assert_eq!(
            RoleResolver::resolve_role(&f.directory, outsider, org.id).await,
            Err(AuthzError::NotAMember)
        );
    }
}

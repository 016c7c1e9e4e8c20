use saasbill_auth::Role;
use saasbill_core::{OrgId, UserId};

/// Authenticated caller for a request.
///
/// Inserted by the auth middleware; handlers behind it can rely on it being present.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UserContext {
    user_id: UserId,
}

impl UserContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

/// Organization scope of a request plus the caller's role in it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OrgContext {
    org_id: OrgId,
    role: Role,
}

impl OrgContext {
    pub fn new(org_id: OrgId, role: Role) -> Self {
        Self { org_id, role }
    }

    pub fn org_id(&self) -> OrgId {
        self.org_id
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

/// Correlation id of the request being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

tokio::task_local! {
    static CURRENT_REQUEST_ID: RequestId;
}

/// Run `fut` with `id` visible to [`current_request_id`].
pub async fn scope_request_id<F: std::future::Future>(id: RequestId, fut: F) -> F::Output {
    CURRENT_REQUEST_ID.scope(id, fut).await
}

/// The id of the request currently being handled, if any.
pub fn current_request_id() -> Option<String> {
    CURRENT_REQUEST_ID.try_with(|id| id.0.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_context_carries_the_gate_role() {
        let org_id = OrgId::new();
        let ctx = OrgContext::new(org_id, Role::Admin);
        assert_eq!(ctx.org_id(), org_id);
        assert_eq!(ctx.role(), Role::Admin);
    }

    #[tokio::test]
    async fn request_id_is_visible_only_inside_its_scope() {
        let seen = scope_request_id(RequestId("req-7".into()), async { current_request_id() }).await;
        assert_eq!(seen.as_deref(), Some("req-7"));
        assert_eq!(current_request_id(), None);
    }
}

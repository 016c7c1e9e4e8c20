use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware::from_fn, routing::get, Router};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use saasbill_api::app::{build_app, services::AppServices};
use saasbill_auth::SessionClaims;
use saasbill_billing::{NewPlan, PlanInterval};
use saasbill_core::UserId;
use saasbill_infra::AppConfig;

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(&[]).await
    }

    async fn spawn_with(extra: &[(&str, &str)]) -> Self {
        let vars: Vec<(String, String)> = [
            ("JWT_SECRET", JWT_SECRET),
            ("ARGON2_MEMORY_KIB", "256"),
            ("ARGON2_ITERATIONS", "1"),
        ]
        .iter()
        .chain(extra)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let config = AppConfig::from_lookup(|key| vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()))
            .expect("valid test config");

        let services = Arc::new(AppServices::in_memory(&config).expect("failed to wire services"));
        Self::serve(build_app(services.clone()), services).await
    }

    async fn serve(app: Router, services: Arc<AppServices>) -> Self {
        // Same router as prod, bound to an ephemeral port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });

        Self {
            base_url,
            services,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.unwrap();
        (res.status(), res.json().await.unwrap())
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.unwrap();
        (res.status(), res.json().await.unwrap())
    }

    /// Register + login; returns (user id, bearer token).
    async fn sign_up(&self, email: &str) -> (String, String) {
        let (status, body) = self
            .post("/api/v1/auth/register", None, json!({ "email": email, "password": "pw123456" }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let user_id = body["data"]["user_id"].as_str().unwrap().to_string();

        let (status, body) = self
            .post("/api/v1/auth/login", None, json!({ "email": email, "password": "pw123456" }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        (user_id, body["data"]["token"].as_str().unwrap().to_string())
    }

    async fn create_org(&self, token: &str, name: &str) -> String {
        let (status, body) = self
            .post("/api/v1/organizations", Some(token), json!({ "name": name }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_plan(&self, name: &str, price_cents: u64, interval: PlanInterval) -> String {
        let plan = self
            .services
            .ledger
            .create_plan(NewPlan {
                name: name.to_string(),
                description: String::new(),
                price_cents,
                interval,
            })
            .await
            .unwrap();
        plan.id.to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(sub: UserId, issued_at: chrono::DateTime<Utc>, ttl: ChronoDuration) -> String {
    let claims = SessionClaims::new(sub, issued_at, ttl);
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn assert_error(body: &Value, code: &str) {
    assert_eq!(body["success"], false, "{body}");
    assert_eq!(body["error"]["code"], code, "{body}");
    assert!(body["error"]["timestamp"].is_string(), "{body}");
    assert!(body.get("data").is_none(), "{body}");
}

// ─────────────────────────────────────────────────────────────────────────────
// System
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_healthy() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.get("/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert!(body["metadata"]["timestamp"].is_string());
}

#[tokio::test]
async fn unknown_route_is_an_enveloped_404() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.get("/api/v1/nope", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NOT_FOUND");
}

#[tokio::test]
async fn every_response_carries_security_headers() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    let h = res.headers();

    assert_eq!(h["x-content-type-options"], "nosniff");
    assert_eq!(h["x-frame-options"], "DENY");
    assert_eq!(h["x-xss-protection"], "1; mode=block");
    assert_eq!(h["strict-transport-security"], "max-age=31536000; includeSubDomains");
    assert_eq!(h["content-security-policy"], "default-src 'self'");
    assert_eq!(h["referrer-policy"], "strict-origin-when-cross-origin");
}

#[tokio::test]
async fn request_id_is_echoed_and_stamped_into_errors() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .get(srv.url("/api/v1/organizations"))
        .header("x-request-id", "trace-abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "trace-abc-123");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["request_id"], "trace-abc-123");

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    let generated = res.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());
}

async fn boom() -> &'static str {
    panic!("boom")
}

#[tokio::test]
async fn panics_become_internal_server_errors() {
    let services = TestServer::spawn().await.services.clone();
    let app = Router::new()
        .route("/boom", get(boom))
        .layer(from_fn(saasbill_api::middleware::catch_panic))
        .layer(from_fn(saasbill_api::middleware::request_id));
    let srv = TestServer::serve(app, services).await;

    let (status, body) = srv.get("/boom", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_error(&body, "INTERNAL_SERVER_ERROR");
    assert_eq!(body["error"]["message"], "An unexpected error occurred");
    assert!(body["error"]["request_id"].is_string());

    // The server keeps serving after a panic.
    let (status, _) = srv.get("/boom", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

// ─────────────────────────────────────────────────────────────────────────────
// Authentication
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_then_login_issues_a_token_for_the_same_user() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv
        .post("/api/v1/auth/register", None, json!({ "email": "a@x.com", "password": "pw123456" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["message"], "User registered successfully");
    let user_id: UserId = body["data"]["user_id"].as_str().unwrap().parse().unwrap();

    let (status, body) = srv
        .post("/api/v1/auth/login", None, json!({ "email": "A@X.com ", "password": "pw123456" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap();

    assert_eq!(srv.services.credentials.validate_token(token).unwrap(), user_id);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let srv = TestServer::spawn().await;
    srv.sign_up("dup@x.com").await;

    let (status, body) = srv
        .post("/api/v1/auth/register", None, json!({ "email": "DUP@x.com", "password": "another-pw" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_error(&body, "EMAIL_ALREADY_REGISTERED");
}

#[tokio::test]
async fn registration_validates_input() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv
        .post("/api/v1/auth/register", None, json!({ "email": "short@x.com", "password": "pw" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_REQUEST");
    assert!(body["error"]["details"].is_string());

    let (status, body) = srv
        .post("/api/v1/auth/register", None, json!({ "email": "not-an-email", "password": "pw123456" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_REQUEST");

    let res = srv
        .client
        .post(srv.url("/api/v1/auth/register"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_error(&res.json::<Value>().await.unwrap(), "INVALID_REQUEST");
}

#[tokio::test]
async fn wrong_password_and_unknown_email_are_indistinguishable() {
    let srv = TestServer::spawn().await;
    srv.sign_up("known@x.com").await;

    let (s1, b1) = srv
        .post("/api/v1/auth/login", None, json!({ "email": "known@x.com", "password": "wrong-password" }))
        .await;
    let (s2, b2) = srv
        .post("/api/v1/auth/login", None, json!({ "email": "ghost@x.com", "password": "pw123456" }))
        .await;

    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s2, StatusCode::UNAUTHORIZED);
    assert_error(&b1, "INVALID_CREDENTIALS");
    assert_eq!(b1["error"]["message"], b2["error"]["message"]);
    assert_eq!(b1["error"]["code"], b2["error"]["code"]);
}

#[tokio::test]
async fn protected_routes_reject_missing_malformed_and_expired_tokens() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv.get("/api/v1/organizations", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_error(&body, "MISSING_AUTHORIZATION");

    let res = srv
        .client
        .get(srv.url("/api/v1/organizations"))
        .header("authorization", "Token abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_error(&res.json::<Value>().await.unwrap(), "INVALID_AUTHORIZATION_FORMAT");

    let (status, body) = srv.get("/api/v1/organizations", Some("not.a.jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_error(&body, "INVALID_TOKEN");

    let expired = mint_jwt(UserId::new(), Utc::now() - ChronoDuration::hours(2), ChronoDuration::hours(1));
    let (status, body) = srv.get("/api/v1/organizations", Some(&expired)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_error(&body, "INVALID_TOKEN");
}

#[tokio::test]
async fn externally_minted_token_with_the_shared_secret_is_accepted() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(UserId::new(), Utc::now(), ChronoDuration::minutes(10));

    let (status, body) = srv.get("/api/v1/organizations", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

// ─────────────────────────────────────────────────────────────────────────────
// Organizations
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn creator_owns_and_lists_the_organization() {
    let srv = TestServer::spawn().await;
    let (_, token) = srv.sign_up("owner@x.com").await;

    let (status, body) = srv
        .post("/api/v1/organizations", Some(&token), json!({ "name": "  Acme  " }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["name"], "Acme");
    let org_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = srv.get("/api/v1/organizations", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"].as_array().unwrap().iter().map(|o| o["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec![org_id.as_str()]);

    let (status, body) = srv
        .post("/api/v1/organizations", Some(&token), json!({ "name": "   " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_REQUEST");
}

#[tokio::test]
async fn owner_adds_member_who_then_lacks_billing_rights() {
    let srv = TestServer::spawn().await;
    let (_, owner) = srv.sign_up("owner@x.com").await;
    let (bob_id, bob) = srv.sign_up("bob@x.com").await;
    let (carol_id, _) = srv.sign_up("carol@x.com").await;
    let org = srv.create_org(&owner, "Acme").await;
    let members = format!("/api/v1/organizations/{org}/members");

    let (status, body) = srv
        .post(&members, Some(&owner), json!({ "user_id": bob_id, "role": "member" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["message"], "Member added successfully");

    // Bob now sees the org but cannot act on it.
    let (_, body) = srv.get("/api/v1/organizations", Some(&bob)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = srv
        .post(&members, Some(&bob), json!({ "user_id": carol_id, "role": "member" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_error(&body, "INSUFFICIENT_PERMISSIONS");

    let (status, body) = srv
        .get(&format!("/api/v1/organizations/{org}/billing/plans"), Some(&bob))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_error(&body, "INSUFFICIENT_PERMISSIONS");

    let (status, body) = srv
        .post(&members, Some(&owner), json!({ "user_id": bob_id, "role": "admin" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_error(&body, "MEMBER_ALREADY_EXISTS");
}

#[tokio::test]
async fn add_member_validates_role_and_user() {
    let srv = TestServer::spawn().await;
    let (_, owner) = srv.sign_up("owner@x.com").await;
    let (bob_id, _) = srv.sign_up("bob@x.com").await;
    let org = srv.create_org(&owner, "Acme").await;
    let members = format!("/api/v1/organizations/{org}/members");

    let (status, body) = srv
        .post(&members, Some(&owner), json!({ "user_id": bob_id, "role": "owner" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_REQUEST");

    let (status, body) = srv
        .post(&members, Some(&owner), json!({ "user_id": bob_id, "role": "superuser" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_REQUEST");

    let (status, body) = srv
        .post(&members, Some(&owner), json!({ "user_id": UserId::new(), "role": "member" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "USER_NOT_FOUND");
}

#[tokio::test]
async fn non_members_are_forbidden_and_bad_ids_rejected() {
    let srv = TestServer::spawn().await;
    let (_, owner) = srv.sign_up("owner@x.com").await;
    let (_, mallory) = srv.sign_up("mallory@x.com").await;
    let org = srv.create_org(&owner, "Acme").await;

    let (status, body) = srv
        .get(&format!("/api/v1/organizations/{org}/billing/invoices"), Some(&mallory))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_error(&body, "NOT_A_MEMBER");
    assert_eq!(body["error"]["message"], "User is not a member of this organization");

    let (status, body) = srv
        .get("/api/v1/organizations/not-a-uuid/billing/plans", Some(&owner))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_REQUEST");
}

#[tokio::test]
async fn organization_listing_paginates_on_request() {
    let srv = TestServer::spawn().await;
    let (_, token) = srv.sign_up("many@x.com").await;
    for i in 0..8 {
        srv.create_org(&token, &format!("Org {i}")).await;
    }

    let (status, body) = srv
        .get("/api/v1/organizations?page=3&page_size=3", Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    let pagination = &body["metadata"]["pagination"];
    assert_eq!(pagination["current_page"], 3);
    assert_eq!(pagination["page_size"], 3);
    assert_eq!(pagination["total_pages"], 3);
    assert_eq!(pagination["total_records"], 8);
    assert_eq!(pagination["has_next"], false);
    assert_eq!(pagination["has_previous"], true);

    let (status, body) = srv.get("/api/v1/organizations", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 8);
    assert!(body["metadata"].get("pagination").is_none());

    let (status, body) = srv
        .get("/api/v1/organizations?page=1&page_size=500", Some(&token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_REQUEST");
}

// ─────────────────────────────────────────────────────────────────────────────
// Billing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn subscribe_opens_period_and_invoice() {
    let srv = TestServer::spawn().await;
    let (_, token) = srv.sign_up("a@x.com").await;
    let org = srv.create_org(&token, "Acme").await;
    let billing = format!("/api/v1/organizations/{org}/billing");

    let (status, body) = srv.get(&format!("{billing}/plans"), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));

    let (status, body) = srv.get(&format!("{billing}/subscription"), Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "SUBSCRIPTION_NOT_FOUND");

    let plan = srv.create_plan("Pro", 2900, PlanInterval::Month).await;
    let (status, body) = srv.get(&format!("{billing}/plans"), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["price_cents"], 2900);
    assert_eq!(body["data"][0]["interval"], "month");

    let (status, body) = srv
        .post(&format!("{billing}/subscribe/{plan}"), Some(&token), json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let sub = &body["data"];
    assert_eq!(sub["status"], "active");
    assert_eq!(sub["org_id"], org.as_str());
    assert_eq!(sub["plan_id"], plan.as_str());
    let start: chrono::DateTime<Utc> = sub["current_period_start"].as_str().unwrap().parse().unwrap();
    let end: chrono::DateTime<Utc> = sub["current_period_end"].as_str().unwrap().parse().unwrap();
    assert!(end - start >= ChronoDuration::days(28) && end - start <= ChronoDuration::days(31));
    let sub_id = sub["id"].as_str().unwrap().to_string();

    let (status, body) = srv.get(&format!("{billing}/subscription"), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], sub_id.as_str());

    let (status, body) = srv.get(&format!("{billing}/invoices"), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let invoices = body["data"].as_array().unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0]["subscription_id"], sub_id.as_str());
    assert_eq!(invoices[0]["amount_cents"], 2900);
    assert_eq!(invoices[0]["status"], "unpaid");
    assert!(invoices[0].get("paid_at").is_none());
}

#[tokio::test]
async fn second_subscription_conflicts() {
    let srv = TestServer::spawn().await;
    let (_, token) = srv.sign_up("a@x.com").await;
    let org = srv.create_org(&token, "Acme").await;
    let monthly = srv.create_plan("Pro", 2900, PlanInterval::Month).await;
    let yearly = srv.create_plan("Pro annual", 29000, PlanInterval::Year).await;

    let (status, _) = srv
        .post(&format!("/api/v1/organizations/{org}/billing/subscribe/{monthly}"), Some(&token), json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = srv
        .post(&format!("/api/v1/organizations/{org}/billing/subscribe/{yearly}"), Some(&token), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_error(&body, "SUBSCRIPTION_ALREADY_ACTIVE");

    let (_, body) = srv
        .get(&format!("/api/v1/organizations/{org}/billing/invoices"), Some(&token))
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn subscribing_to_an_unknown_plan_is_404() {
    let srv = TestServer::spawn().await;
    let (_, token) = srv.sign_up("a@x.com").await;
    let org = srv.create_org(&token, "Acme").await;

    let (status, body) = srv
        .post(
            &format!("/api/v1/organizations/{org}/billing/subscribe/{}", uuid::Uuid::now_v7()),
            Some(&token),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "PLAN_NOT_FOUND");

    let (status, body) = srv
        .post(&format!("/api/v1/organizations/{org}/billing/subscribe/nope"), Some(&token), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "INVALID_REQUEST");
}

// ─────────────────────────────────────────────────────────────────────────────
// Rate limiting
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn api_requests_beyond_the_window_are_throttled() {
    let srv = TestServer::spawn_with(&[("RATE_LIMIT_REQUESTS", "3"), ("RATE_LIMIT_WINDOW_SECS", "60")]).await;

    for _ in 0..3 {
        let (status, _) = srv.get("/api/v1/organizations", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let res = srv.client.get(srv.url("/api/v1/organizations")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()["retry-after"], "60");
    let body: Value = res.json().await.unwrap();
    assert_error(&body, "RATE_LIMIT_EXCEEDED");

    // Health sits outside the limited prefix.
    let (status, _) = srv.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

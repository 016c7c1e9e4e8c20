use std::net::{IpAddr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use tracing::{error, info};
use uuid::Uuid;

use saasbill_auth::{authorize_member, Role, RoleResolver};
use saasbill_infra::rate_limit::RateLimiter;
use saasbill_infra::services::CredentialStore;

use crate::app::dto::OrgPath;
use crate::app::errors::{ApiError, OrFail, AUTHORIZATION, RATE_LIMIT};
use crate::app::extract::ApiPath;
use crate::context::{current_request_id, scope_request_id, OrgContext, RequestId, UserContext};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const MAX_REQUEST_ID_LEN: usize = 128;

// ─────────────────────────────────────────────────────────────────────────────
// Authentication
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AuthState {
    pub credentials: CredentialStore,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?;
    let user_id = state
        .credentials
        .validate_token(token)
        .or_fail(AUTHORIZATION)?;

    req.extensions_mut().insert(UserContext::new(user_id));
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers.get(header::AUTHORIZATION).ok_or_else(|| {
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            "MISSING_AUTHORIZATION",
            "Authorization header required",
        )
    })?;

    let invalid_format = || {
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            "INVALID_AUTHORIZATION_FORMAT",
            "Invalid authorization header format",
        )
    };

    let header = header.to_str().map_err(|_| invalid_format())?;
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(invalid_format()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Organization role gate
// ─────────────────────────────────────────────────────────────────────────────

/// Admits a request to an organization-scoped route only when the caller
/// holds one of `allowed` in the organization named by the `:org_id` segment.
#[derive(Clone)]
pub struct RoleGate {
    pub resolver: Arc<dyn RoleResolver>,
    pub allowed: &'static [Role],
}

pub async fn require_org_role(
    State(gate): State<RoleGate>,
    ApiPath(OrgPath { org_id }): ApiPath<OrgPath>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = req.extensions().get::<UserContext>().copied().ok_or_else(|| {
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            "MISSING_AUTHORIZATION",
            "Authorization header required",
        )
    })?;

    let role = authorize_member(gate.resolver.as_ref(), user.user_id(), org_id, gate.allowed)
        .await
        .or_fail(AUTHORIZATION)?;

    req.extensions_mut().insert(OrgContext::new(org_id, role));
    Ok(next.run(req).await)
}

// ─────────────────────────────────────────────────────────────────────────────
// Cross-cutting layers
// ─────────────────────────────────────────────────────────────────────────────

/// Accept a sane client `X-Request-ID` or mint one, expose it to the error
/// envelope and echo it on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| is_acceptable_request_id(v))
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut res = scope_request_id(RequestId(id.clone()), next.run(req)).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(X_REQUEST_ID, value);
    }
    res
}

fn is_acceptable_request_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN && id.bytes().all(|b| b.is_ascii_graphic())
}

pub async fn security_headers(req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'self'"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    res
}

pub async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let request_id = req.extensions().get::<RequestId>().map(|id| id.as_str().to_owned());
    let client_ip = client_ip(&req).map(|ip| ip.to_string());
    let started = Instant::now();

    let res = next.run(req).await;

    info!(
        %method,
        path = %path,
        status = res.status().as_u16(),
        duration_ms = started.elapsed().as_millis() as u64,
        request_id = request_id.as_deref().unwrap_or("-"),
        client_ip = client_ip.as_deref().unwrap_or("-"),
        "request completed"
    );
    res
}

pub async fn catch_panic(req: Request, next: Next) -> Response {
    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(res) => res,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            let request_id = current_request_id();
            error!(
                request_id = request_id.as_deref().unwrap_or("-"),
                panic = %reason,
                "handler panicked"
            );
            ApiError::internal().into_response()
        }
    }
}

/// Per-client-IP limit; adds `X-RateLimit-*` headers and answers 429 with
/// `Retry-After` once the window is full.
pub async fn rate_limit(
    State(limiter): State<Arc<dyn RateLimiter>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_ip(&req)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_owned());
    let decision = limiter.check(&key).await.or_fail(RATE_LIMIT)?;
    let window_secs = decision.window.as_secs().max(1);

    let mut res = if decision.allowed {
        next.run(req).await
    } else {
        let mut res = ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMIT_EXCEEDED",
            format!("Rate limit exceeded. Try again in {window_secs}s"),
        )
        .into_response();
        res.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(window_secs));
        res
    };

    let headers = res.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    Ok(res)
}

fn client_ip(req: &Request) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

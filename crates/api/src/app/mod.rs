//! HTTP API application wiring (axum router + service wiring).
//!
//! - `services.rs`: store, credential, directory, ledger and rate-limit wiring
//! - `routes/`: HTTP handlers (one file per area)
//! - `dto.rs`: request/response bodies and path/query parameters
//! - `envelope.rs`: the JSON envelope every response uses
//! - `errors.rs`: service error to envelope mapping
//! - `extract.rs`: extractors that reject with the envelope

use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Extension, Router,
};
use tower::ServiceBuilder;

use saasbill_auth::{RoleResolver, OWNER_OR_ADMIN};

use crate::middleware::{self, AuthState, RoleGate};

pub mod dto;
pub mod envelope;
pub mod errors;
pub mod extract;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the tests).
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// rate limiter and request log see the client address.
pub fn build_app(services: Arc<AppServices>) -> Router {
    let auth_state = AuthState {
        credentials: services.credentials.clone(),
    };
    let resolver: Arc<dyn RoleResolver> = Arc::new(services.directory.clone());
    let gate = RoleGate {
        resolver,
        allowed: OWNER_OR_ADMIN,
    };

    // Organization-scoped routes: the caller must be owner or admin of `:org_id`.
    let org_scoped = Router::new()
        .route("/members", post(routes::organizations::add_member))
        .route("/billing/plans", get(routes::billing::list_plans))
        .route("/billing/subscribe/:plan_id", post(routes::billing::subscribe))
        .route("/billing/subscription", get(routes::billing::current_subscription))
        .route("/billing/invoices", get(routes::billing::list_invoices))
        .route_layer(from_fn_with_state(gate, middleware::require_org_role));

    // Protected routes: require a valid bearer token.
    let protected = Router::new()
        .route(
            "/organizations",
            post(routes::organizations::create_organization).get(routes::organizations::list_organizations),
        )
        .nest("/organizations/:org_id", org_scoped)
        .route_layer(from_fn_with_state(auth_state, middleware::auth_middleware));

    let mut api = Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .merge(protected);
    if let Some(limiter) = services.rate_limiter.clone() {
        api = api.layer(from_fn_with_state(limiter, middleware::rate_limit));
    }

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api/v1", api)
        .fallback(routes::system::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(middleware::security_headers))
                .layer(from_fn(middleware::request_id))
                .layer(from_fn(middleware::log_request))
                .layer(from_fn(middleware::catch_panic))
                .layer(Extension(services)),
        )
}

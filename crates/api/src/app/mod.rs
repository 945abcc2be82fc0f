//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, event bus and optional external clients
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: query/request DTOs and storefront views
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing::get, Extension, Router};
use tower::ServiceBuilder;

use shopfront_auth::Hs256JwtValidator;

use crate::app::services::AppServices;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>, jwt_secret: String) -> Router {
    let jwt = Arc::new(Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Admin routes: require a valid bearer token.
    let admin = routes::admin_router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/storefront", routes::storefront_router())
        .nest("/webhooks", routes::webhooks::router())
        .nest("/admin", admin)
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
                .layer(Extension(services)),
        )
}

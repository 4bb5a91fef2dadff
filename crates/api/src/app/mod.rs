//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services/`: the use cases; every entry point takes the caller's actor
//! - `routes/`: HTTP handlers, one file per area
//! - `dto.rs`: request bodies and their mapping onto service inputs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, extract::DefaultBodyLimit, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

const MIN_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Build the full HTTP router over `services`.
pub fn build_app(services: Arc<BackOffice>) -> Router {
    let body_limit = usize::try_from(services.config().logo_max_bytes)
        .unwrap_or(usize::MAX)
        .saturating_mul(2)
        .max(MIN_BODY_LIMIT);

    // Protected routes: require a valid bearer token.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        Arc::clone(&services),
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::public_router())
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(Extension(services))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
}

pub use services::BackOffice;

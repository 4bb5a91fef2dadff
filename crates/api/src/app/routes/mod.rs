use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;

pub mod authz;
pub mod businesses;
pub mod catalog;
pub mod identity;
pub mod invoices;
pub mod system;
pub mod tenants;
pub mod users;

/// Routes reachable without a bearer token.
pub fn public_router() -> Router {
    Router::new()
        .route("/register", post(identity::register))
        .route("/verify-email", get(identity::verify_email))
        .route("/login", post(identity::login))
        .route("/login/resume", post(identity::resume))
        .route("/users/accept-invitation", post(identity::accept_invitation))
}

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/me", get(system::me))
        .route("/logout", post(system::logout))
        .nest("/users", users::router())
        .nest("/tenants", tenants::router())
        .nest("/businesses", businesses::router())
        .nest("/invoices", invoices::router())
        .nest("/taxes", catalog::tax_router())
        .nest("/invoice-statuses", catalog::status_router())
        .nest("/authz", authz::router())
}

/// `200 {"items": [...]}`
pub(crate) fn items<T: Serialize>(items: Vec<T>) -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub(crate) fn ok<T: Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

pub(crate) fn created<T: Serialize>(body: T) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

pub(crate) fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

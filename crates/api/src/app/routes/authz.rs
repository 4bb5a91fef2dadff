//! Authorization audit endpoint for admin-tenant operators.
//!
//! Answers "why was this request denied?" by running the policy for a user
//! and a described request without performing it.

use std::sync::Arc;

use axum::{Json, Router, extract::Extension, response::Response, routing::post};

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::app::services::BackOffice;
use crate::context::AuthContext;

use super::ok;

pub fn router() -> Router {
    Router::new().route("/explain", post(explain_access))
}

/// POST /authz/explain
pub async fn explain_access(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<dto::ExplainRequest>,
) -> ApiResult<Response> {
    let request = body.access();
    Ok(ok(services.explain_access(auth.actor(), body.user_id, request).await?))
}

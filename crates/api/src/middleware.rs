use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, middleware::Next, response::Response};

use crate::app::errors::ApiError;
use crate::app::services::BackOffice;
use crate::context::AuthContext;

pub async fn auth_middleware(
    State(services): State<Arc<BackOffice>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?.to_string();

    let actor = services.authenticate(&token).await?.ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(AuthContext::new(actor, token));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(ApiError::Unauthorized)?;

    let header = header.to_str().map_err(|_| ApiError::Unauthorized)?;

    let header = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(ApiError::Unauthorized);
    }

    Ok(token)
}

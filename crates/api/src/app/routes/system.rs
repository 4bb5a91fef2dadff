use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::Response};

use crate::app::errors::ApiResult;
use crate::app::services::BackOffice;
use crate::context::AuthContext;

use super::{no_content, ok};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Profile of the caller: user, tenant and issuer business.
pub async fn me(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Response> {
    Ok(ok(services.profile(auth.actor()).await?))
}

pub async fn logout(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Response> {
    services.logout(auth.actor(), auth.token())?;
    Ok(no_content())
}

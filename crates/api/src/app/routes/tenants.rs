use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::Response,
    routing::get,
};

use invoicer_core::TenantId;

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::app::services::BackOffice;
use crate::context::AuthContext;

use super::{created, items, no_content, ok};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_tenants).post(create_tenant))
        .route("/:id", get(get_tenant).patch(update_tenant).delete(delete_tenant))
}

pub async fn list_tenants(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Response> {
    Ok(items(services.list_tenants(auth.actor()).await?))
}

pub async fn get_tenant(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TenantId>,
) -> ApiResult<Response> {
    Ok(ok(services.get_tenant(auth.actor(), id).await?))
}

pub async fn create_tenant(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<dto::CreateTenantRequest>,
) -> ApiResult<Response> {
    Ok(created(services.create_tenant(auth.actor(), body.into()).await?))
}

pub async fn update_tenant(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TenantId>,
    Json(body): Json<dto::UpdateTenantRequest>,
) -> ApiResult<Response> {
    Ok(ok(services.update_tenant(auth.actor(), id, body.into()).await?))
}

pub async fn delete_tenant(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TenantId>,
) -> ApiResult<Response> {
    services.delete_tenant(auth.actor(), id).await?;
    Ok(no_content())
}

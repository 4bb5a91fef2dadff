use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::Response,
    routing::get,
};

use invoicer_core::{InvoiceStatusId, TaxId};
use invoicer_invoicing::{InvoiceStatusDraft, TaxDraft};

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::app::services::BackOffice;
use crate::context::AuthContext;

use super::{created, items, no_content, ok};

pub fn tax_router() -> Router {
    Router::new()
        .route("/", get(list_taxes).post(create_tax))
        .route("/:id", get(get_tax).patch(update_tax).delete(delete_tax))
}

pub fn status_router() -> Router {
    Router::new()
        .route("/", get(list_statuses).post(create_status))
        .route("/:id", get(get_status).patch(rename_status).delete(delete_status))
}

pub async fn list_taxes(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Response> {
    Ok(items(services.list_taxes(auth.actor()).await?))
}

pub async fn get_tax(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TaxId>,
) -> ApiResult<Response> {
    Ok(ok(services.get_tax(auth.actor(), id).await?))
}

pub async fn create_tax(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<TaxDraft>,
) -> ApiResult<Response> {
    Ok(created(services.create_tax(auth.actor(), body).await?))
}

pub async fn update_tax(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TaxId>,
    Json(body): Json<dto::UpdateTaxRequest>,
) -> ApiResult<Response> {
    let patch = body.into_patch()?;
    Ok(ok(services.update_tax(auth.actor(), id, patch).await?))
}

pub async fn delete_tax(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TaxId>,
) -> ApiResult<Response> {
    services.delete_tax(auth.actor(), id).await?;
    Ok(no_content())
}

pub async fn list_statuses(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Response> {
    Ok(items(services.list_statuses(auth.actor()).await?))
}

pub async fn get_status(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<InvoiceStatusId>,
) -> ApiResult<Response> {
    Ok(ok(services.get_status(auth.actor(), id).await?))
}

pub async fn create_status(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<InvoiceStatusDraft>,
) -> ApiResult<Response> {
    Ok(created(services.create_status(auth.actor(), body).await?))
}

pub async fn rename_status(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<InvoiceStatusId>,
    Json(body): Json<dto::RenameStatusRequest>,
) -> ApiResult<Response> {
    Ok(ok(services.rename_status(auth.actor(), id, &body.code).await?))
}

pub async fn delete_status(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<InvoiceStatusId>,
) -> ApiResult<Response> {
    services.delete_status(auth.actor(), id).await?;
    Ok(no_content())
}

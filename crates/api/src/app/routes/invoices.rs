use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
};

use invoicer_core::{InvoiceId, InvoiceItemId};

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::app::services::BackOffice;
use crate::context::AuthContext;

use super::{created, items, ok};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_all_invoices))
        .route("/export/excel", get(export_all_invoices))
        .route("/:invoice_id/items", get(list_items).post(add_item))
        .route("/:invoice_id/items/reorder", post(reorder_items))
        .route(
            "/:invoice_id/items/:item_id",
            get(get_item).patch(update_item).delete(delete_item),
        )
}

pub async fn list_all_invoices(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<dto::AllInvoicesQuery>,
) -> ApiResult<Response> {
    let invoices = services.list_all_invoices(auth.actor(), query.business_id, query.status.as_deref()).await?;
    Ok(items(invoices))
}

pub async fn export_all_invoices(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<dto::AllInvoicesQuery>,
) -> ApiResult<Response> {
    let file = services
        .export_all_invoices(auth.actor(), query.business_id, query.status.as_deref())
        .await?;
    Ok(dto::attachment(file))
}

pub async fn list_items(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(invoice_id): Path<InvoiceId>,
) -> ApiResult<Response> {
    Ok(items(services.list_items(auth.actor(), invoice_id).await?))
}

pub async fn get_item(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path((invoice_id, item_id)): Path<(InvoiceId, InvoiceItemId)>,
) -> ApiResult<Response> {
    Ok(ok(services.get_item(auth.actor(), invoice_id, item_id).await?))
}

pub async fn add_item(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(invoice_id): Path<InvoiceId>,
    Json(body): Json<dto::ItemRequest>,
) -> ApiResult<Response> {
    let input = body.into_input()?;
    Ok(created(services.add_item(auth.actor(), invoice_id, input).await?))
}

pub async fn update_item(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path((invoice_id, item_id)): Path<(InvoiceId, InvoiceItemId)>,
    Json(body): Json<dto::ItemPatchRequest>,
) -> ApiResult<Response> {
    let input = body.into_input()?;
    Ok(ok(services.update_item(auth.actor(), invoice_id, item_id, input).await?))
}

/// Responds with the re-aggregated invoice header.
pub async fn delete_item(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path((invoice_id, item_id)): Path<(InvoiceId, InvoiceItemId)>,
) -> ApiResult<Response> {
    Ok(ok(services.delete_item(auth.actor(), invoice_id, item_id).await?))
}

pub async fn reorder_items(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(invoice_id): Path<InvoiceId>,
    Json(body): Json<dto::ReorderRequest>,
) -> ApiResult<Response> {
    Ok(ok(services.reorder_items(auth.actor(), invoice_id, &body.item_ids).await?))
}

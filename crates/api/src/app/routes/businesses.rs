use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path, Query},
    response::Response,
    routing::get,
};

use invoicer_catalog::{ArticleDraft, ArticlePatch};
use invoicer_core::{ArticleId, BankAccountId, BusinessId, InvoiceId};
use invoicer_parties::{BankAccountDraft, BankAccountPatch, BusinessPatch};

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::app::services::BackOffice;
use crate::context::AuthContext;

use super::{created, items, no_content, ok};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_businesses).post(create_business))
        .route("/receivers", get(list_receivers))
        .route("/:id", get(get_business).patch(update_business).delete(delete_business))
        .route("/:id/logo", axum::routing::post(upload_logo).delete(remove_logo))
        .route("/:id/bank-accounts", get(list_bank_accounts).post(create_bank_account))
        .route(
            "/:id/bank-accounts/:account_id",
            get(get_bank_account).patch(update_bank_account).delete(delete_bank_account),
        )
        .route("/:id/articles", get(list_articles).post(create_article))
        .route(
            "/:id/articles/:article_id",
            get(get_article).patch(update_article).delete(delete_article),
        )
        .route("/:id/invoices", get(list_invoices).post(create_invoice))
        .route("/:id/invoices/export/excel", get(export_invoices))
        .route(
            "/:id/invoices/:invoice_id",
            get(get_invoice).patch(update_invoice).delete(delete_invoice),
        )
        .route("/:id/invoices/:invoice_id/pdf", get(invoice_pdf))
}

// -------------------------
// Businesses
// -------------------------

pub async fn list_businesses(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Response> {
    Ok(items(services.list_businesses(auth.actor()).await?))
}

pub async fn list_receivers(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Response> {
    Ok(items(services.receivers(auth.actor()).await?))
}

pub async fn get_business(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BusinessId>,
) -> ApiResult<Response> {
    Ok(ok(services.get_business(auth.actor(), id).await?))
}

pub async fn create_business(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<dto::CreateBusinessRequest>,
) -> ApiResult<Response> {
    Ok(created(services.create_business(auth.actor(), body.tenant_id, body.profile).await?))
}

pub async fn update_business(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BusinessId>,
    Json(body): Json<BusinessPatch>,
) -> ApiResult<Response> {
    Ok(ok(services.update_business(auth.actor(), id, body).await?))
}

pub async fn delete_business(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BusinessId>,
) -> ApiResult<Response> {
    services.delete_business(auth.actor(), id).await?;
    Ok(no_content())
}

/// Raw image bytes in the body, original file name in `?file_name=`.
pub async fn upload_logo(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BusinessId>,
    Query(query): Query<dto::LogoQuery>,
    body: Bytes,
) -> ApiResult<Response> {
    let business = services
        .upload_logo(auth.actor(), id, &query.file_name, body.to_vec())
        .await?;
    Ok(ok(business))
}

pub async fn remove_logo(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BusinessId>,
) -> ApiResult<Response> {
    Ok(ok(services.remove_logo(auth.actor(), id).await?))
}

// -------------------------
// Bank accounts
// -------------------------

pub async fn list_bank_accounts(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BusinessId>,
) -> ApiResult<Response> {
    Ok(items(services.list_bank_accounts(auth.actor(), id).await?))
}

pub async fn get_bank_account(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path((id, account_id)): Path<(BusinessId, BankAccountId)>,
) -> ApiResult<Response> {
    Ok(ok(services.get_bank_account(auth.actor(), id, account_id).await?))
}

pub async fn create_bank_account(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BusinessId>,
    Json(body): Json<BankAccountDraft>,
) -> ApiResult<Response> {
    Ok(created(services.create_bank_account(auth.actor(), id, body).await?))
}

pub async fn update_bank_account(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path((id, account_id)): Path<(BusinessId, BankAccountId)>,
    Json(body): Json<BankAccountPatch>,
) -> ApiResult<Response> {
    Ok(ok(services.update_bank_account(auth.actor(), id, account_id, body).await?))
}

pub async fn delete_bank_account(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path((id, account_id)): Path<(BusinessId, BankAccountId)>,
) -> ApiResult<Response> {
    services.delete_bank_account(auth.actor(), id, account_id).await?;
    Ok(no_content())
}

// -------------------------
// Articles
// -------------------------

pub async fn list_articles(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BusinessId>,
) -> ApiResult<Response> {
    Ok(items(services.list_articles(auth.actor(), id).await?))
}

pub async fn get_article(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path((id, article_id)): Path<(BusinessId, ArticleId)>,
) -> ApiResult<Response> {
    Ok(ok(services.get_article(auth.actor(), id, article_id).await?))
}

pub async fn create_article(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BusinessId>,
    Json(body): Json<ArticleDraft>,
) -> ApiResult<Response> {
    Ok(created(services.create_article(auth.actor(), id, body).await?))
}

pub async fn update_article(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path((id, article_id)): Path<(BusinessId, ArticleId)>,
    Json(body): Json<ArticlePatch>,
) -> ApiResult<Response> {
    Ok(ok(services.update_article(auth.actor(), id, article_id, body).await?))
}

pub async fn delete_article(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path((id, article_id)): Path<(BusinessId, ArticleId)>,
) -> ApiResult<Response> {
    services.delete_article(auth.actor(), id, article_id).await?;
    Ok(no_content())
}

// -------------------------
// Invoices under a business
// -------------------------

pub async fn list_invoices(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BusinessId>,
    Query(query): Query<dto::StatusQuery>,
) -> ApiResult<Response> {
    Ok(items(services.list_invoices(auth.actor(), id, query.status.as_deref()).await?))
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path((id, invoice_id)): Path<(BusinessId, InvoiceId)>,
) -> ApiResult<Response> {
    Ok(ok(services.get_invoice(auth.actor(), id, invoice_id).await?))
}

pub async fn create_invoice(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BusinessId>,
    Json(body): Json<dto::CreateInvoiceRequest>,
) -> ApiResult<Response> {
    let input = body.into_input()?;
    Ok(created(services.create_invoice(auth.actor(), id, input).await?))
}

pub async fn update_invoice(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path((id, invoice_id)): Path<(BusinessId, InvoiceId)>,
    Json(body): Json<dto::UpdateInvoiceRequest>,
) -> ApiResult<Response> {
    let update = body.into_update()?;
    Ok(ok(services.update_invoice(auth.actor(), id, invoice_id, update).await?))
}

pub async fn delete_invoice(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path((id, invoice_id)): Path<(BusinessId, InvoiceId)>,
) -> ApiResult<Response> {
    services.delete_invoice(auth.actor(), id, invoice_id).await?;
    Ok(no_content())
}

pub async fn invoice_pdf(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path((id, invoice_id)): Path<(BusinessId, InvoiceId)>,
) -> ApiResult<Response> {
    let file = services.invoice_pdf(auth.actor(), id, invoice_id).await?;
    Ok(dto::attachment(file))
}

pub async fn export_invoices(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<BusinessId>,
    Query(query): Query<dto::StatusQuery>,
) -> ApiResult<Response> {
    let file = services
        .export_invoices(auth.actor(), id, query.status.as_deref())
        .await?;
    Ok(dto::attachment(file))
}

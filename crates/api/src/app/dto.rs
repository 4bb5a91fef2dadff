//! Request bodies and their mapping onto service inputs.
//!
//! Amounts may arrive as JSON numbers or numeric strings; both are parsed
//! into exact decimals here so nothing below ever sees a float.

use std::collections::BTreeSet;
use std::str::FromStr;

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use invoicer_auth::{AccessRequest, Action, ResourceKind, Role, Scope};
use invoicer_core::{ArticleId, BusinessId, Decimal, InvoiceItemId, TaxId, TenantId, UserId};
use invoicer_infra::external::RenderedFile;
use invoicer_invoicing::TaxPatch;
use invoicer_parties::{BusinessDraft, NewTenant, TenantPatch};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::services::{
    InvoiceInput, InvoiceUpdate, ItemInput, ItemPatchInput, NewUserInput, TaxRef, UserUpdate,
};

/// Deserialize a field that distinguishes "absent" (`None`, via
/// `#[serde(default)]`) from "present, possibly null".
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

// -------------------------
// Identity
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub tenant_id: Option<TenantId>,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    pub remember_me_token: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub token: String,
    pub password: String,
}

// -------------------------
// Users
// -------------------------

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub tenant_id: Option<TenantId>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub roles: BTreeSet<Role>,
    pub tenant_id: Option<TenantId>,
    #[serde(default)]
    pub email_verified: bool,
    pub is_active: Option<bool>,
}

impl From<CreateUserRequest> for NewUserInput {
    fn from(body: CreateUserRequest) -> Self {
        NewUserInput {
            email: body.email,
            password: body.password,
            roles: body.roles,
            tenant_id: body.tenant_id,
            email_verified: body.email_verified,
            is_active: body.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InviteUserRequest {
    pub email: String,
    #[serde(default)]
    pub roles: BTreeSet<Role>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub roles: Option<BTreeSet<Role>>,
    pub is_active: Option<bool>,
    pub tenant_id: Option<TenantId>,
}

impl From<UpdateUserRequest> for UserUpdate {
    fn from(body: UpdateUserRequest) -> Self {
        UserUpdate {
            email: body.email,
            password: body.password,
            roles: body.roles,
            is_active: body.is_active,
            tenant_id: body.tenant_id,
        }
    }
}

// -------------------------
// Tenants and businesses
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    #[serde(default)]
    pub has_paid: bool,
    #[serde(default)]
    pub is_admin: bool,
}

impl From<CreateTenantRequest> for NewTenant {
    fn from(body: CreateTenantRequest) -> Self {
        NewTenant {
            name: body.name,
            has_paid: body.has_paid,
            is_admin: body.is_admin,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateTenantRequest {
    pub name: Option<String>,
    pub has_paid: Option<bool>,
    pub is_admin: Option<bool>,
    pub issuer_business_id: Option<BusinessId>,
}

impl From<UpdateTenantRequest> for TenantPatch {
    fn from(body: UpdateTenantRequest) -> Self {
        TenantPatch {
            name: body.name,
            has_paid: body.has_paid,
            is_admin: body.is_admin,
            issuer_business_id: body.issuer_business_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBusinessRequest {
    pub tenant_id: Option<TenantId>,
    #[serde(flatten)]
    pub profile: BusinessDraft,
}

#[derive(Debug, Deserialize)]
pub struct LogoQuery {
    pub file_name: String,
}

// -------------------------
// Taxes and statuses
// -------------------------

#[derive(Debug, Deserialize)]
pub struct UpdateTaxRequest {
    #[serde(default, deserialize_with = "present")]
    pub rate: Option<Value>,
    pub name: Option<String>,
}

impl UpdateTaxRequest {
    pub fn into_patch(self) -> ApiResult<TaxPatch> {
        let rate = match self.rate {
            None => None,
            Some(Value::Null) => Some(None),
            Some(value) => Some(Some(decimal(&value, "Tax rate must be a number")?)),
        };
        Ok(TaxPatch { rate, name: self.name })
    }
}

#[derive(Debug, Deserialize)]
pub struct RenameStatusRequest {
    pub code: String,
}

// -------------------------
// Invoices
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AllInvoicesQuery {
    pub business_id: Option<BusinessId>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ItemRequest {
    #[serde(default)]
    pub description: String,
    pub quantity: Option<Value>,
    pub unit_price: Option<Value>,
    pub article_id: Option<ArticleId>,
    pub tax_id: Option<TaxId>,
    #[serde(default, deserialize_with = "present")]
    pub tax_rate: Option<Value>,
}

impl ItemRequest {
    pub fn into_input(self) -> ApiResult<ItemInput> {
        let quantity = required_decimal(self.quantity.as_ref(), "Item quantity is required and must be a number")?;
        let unit_price =
            required_decimal(self.unit_price.as_ref(), "Item unit price is required and must be a number")?;
        Ok(ItemInput {
            description: self.description,
            quantity,
            unit_price,
            article_id: self.article_id,
            tax: tax_ref(self.tax_id, self.tax_rate)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ItemPatchRequest {
    pub description: Option<String>,
    pub quantity: Option<Value>,
    pub unit_price: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub article_id: Option<Value>,
    pub tax_id: Option<TaxId>,
    #[serde(default, deserialize_with = "present")]
    pub tax_rate: Option<Value>,
}

impl ItemPatchRequest {
    pub fn into_input(self) -> ApiResult<ItemPatchInput> {
        let quantity = self
            .quantity
            .as_ref()
            .map(|v| decimal(v, "Item quantity must be a number"))
            .transpose()?;
        let unit_price = self
            .unit_price
            .as_ref()
            .map(|v| decimal(v, "Item unit price must be a number"))
            .transpose()?;
        let article_id = match self.article_id {
            None => None,
            Some(Value::Null) => Some(None),
            Some(value) => Some(Some(
                serde_json::from_value::<ArticleId>(value)
                    .map_err(|_| ApiError::bad_request("Article ID must be a number"))?,
            )),
        };
        Ok(ItemPatchInput {
            description: self.description,
            quantity,
            unit_price,
            article_id,
            tax: tax_ref(self.tax_id, self.tax_rate)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub receiver_id: Option<BusinessId>,
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemRequest>,
}

impl CreateInvoiceRequest {
    pub fn into_input(self) -> ApiResult<InvoiceInput> {
        Ok(InvoiceInput {
            receiver_id: self.receiver_id,
            invoice_date: optional_date(self.invoice_date.as_deref())?,
            due_date: optional_date(self.due_date.as_deref())?,
            status: self.status,
            items: self
                .items
                .into_iter()
                .map(ItemRequest::into_input)
                .collect::<ApiResult<_>>()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateInvoiceRequest {
    pub issuer_id: Option<BusinessId>,
    pub receiver_id: Option<BusinessId>,
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub status: Option<String>,
    pub items: Option<Vec<ItemRequest>>,
}

impl UpdateInvoiceRequest {
    pub fn into_update(self) -> ApiResult<InvoiceUpdate> {
        let items = match self.items {
            Some(items) => Some(
                items
                    .into_iter()
                    .map(ItemRequest::into_input)
                    .collect::<ApiResult<_>>()?,
            ),
            None => None,
        };
        Ok(InvoiceUpdate {
            issuer_id: self.issuer_id,
            receiver_id: self.receiver_id,
            invoice_date: optional_date(self.invoice_date.as_deref())?,
            due_date: optional_date(self.due_date.as_deref())?,
            status: self.status,
            items,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub item_ids: Vec<InvoiceItemId>,
}

// -------------------------
// Authorization
// -------------------------

/// `scope` is `{"kind": "tenant", "tenant_id": 2}`, `{"kind": "global"}` or
/// `{"kind": "all_tenants"}`.
#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    pub user_id: Option<UserId>,
    pub action: Action,
    pub resource: ResourceKind,
    pub scope: Scope,
}

impl ExplainRequest {
    pub fn access(&self) -> AccessRequest {
        AccessRequest::new(self.action, self.resource, self.scope)
    }
}

// -------------------------
// Parsing helpers
// -------------------------

fn decimal(value: &Value, message: &str) -> ApiResult<Decimal> {
    let parsed = match value {
        Value::Number(n) => {
            let raw = n.to_string();
            Decimal::from_str(&raw).or_else(|_| Decimal::from_scientific(&raw)).ok()
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ApiError::bad_request(message))
}

fn required_decimal(value: Option<&Value>, message: &str) -> ApiResult<Decimal> {
    match value {
        Some(value) => decimal(value, message),
        None => Err(ApiError::bad_request(message)),
    }
}

/// `tax_id` wins over `tax_rate`; an explicit `"tax_rate": null` picks the
/// exempted tax.
fn tax_ref(tax_id: Option<TaxId>, tax_rate: Option<Value>) -> ApiResult<Option<TaxRef>> {
    if let Some(id) = tax_id {
        return Ok(Some(TaxRef::Id(id)));
    }
    match tax_rate {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(TaxRef::Rate(None))),
        Some(value) => Ok(Some(TaxRef::Rate(Some(decimal(&value, "Tax rate must be a number")?)))),
    }
}

pub fn parse_date(raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| ApiError::bad_request("Invalid date format"))
}

fn optional_date(raw: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    raw.filter(|r| !r.trim().is_empty()).map(parse_date).transpose()
}

// -------------------------
// Responses
// -------------------------

/// Stream a rendered document back as an attachment.
pub fn attachment(file: RenderedFile) -> Response {
    let content_type = HeaderValue::from_str(&file.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file.file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)],
        file.bytes,
    )
        .into_response()
}

//! Relational storage boundary.
//!
//! The back office talks to storage through [`BackOfficeStore`], an async
//! trait split by area ([`PartyStore`], [`CatalogStore`], [`InvoiceStore`]).
//! Two implementations exist:
//!
//! - [`InMemoryStore`]: tables behind one `RwLock`, used by tests and local
//!   runs without a database.
//! - [`PostgresStore`]: sqlx over PostgreSQL, where unique keys, foreign keys
//!   and cascades are enforced by the schema in `migrations/`.
//!
//! Both own the relational rules (unique keys, cascades, set-null and
//! restrict on delete) and report them through [`StoreError`]. Authorization
//! is never checked here.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use invoicer_auth::User;
use invoicer_catalog::Article;
use invoicer_core::{
    ArticleId, BankAccountId, BusinessId, Decimal, DomainError, DomainResult, InvoiceId, InvoiceStatusId, TaxId,
    TenantId, UserId,
};
use invoicer_invoicing::{
    Invoice, InvoiceNumber, InvoiceStatus, InvoiceStatusDraft, InvoiceWithItems, Tax, TaxDraft,
    status::DEFAULT_CODES, tax::ALLOWED_RATES,
};
use invoicer_parties::{BankAccount, Business, Tenant};

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique key is already taken.
    #[error("unique violation: {0}")]
    UniqueViolation(String),

    /// A delete is blocked by a referencing row, or an insert references a
    /// missing row.
    #[error("referential violation: {0}")]
    ReferentialViolation(String),

    #[error("row not found: {0}")]
    Missing(String),

    #[error("store lock poisoned")]
    Poisoned,

    /// The database failed or returned something unreadable.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(msg) | StoreError::ReferentialViolation(msg) => {
                DomainError::conflict(msg)
            }
            StoreError::Missing(msg) => DomainError::not_found(msg),
            StoreError::Poisoned | StoreError::Backend(_) => DomainError::external("store unavailable"),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-table id sequences. Ids start at 1 and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    Tenant,
    User,
    Business,
    BankAccount,
    Article,
    Tax,
    InvoiceStatus,
    Invoice,
    InvoiceItem,
}

/// Invoice listing filter. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvoiceFilter {
    pub issuer_id: Option<BusinessId>,
    pub status_id: Option<InvoiceStatusId>,
}

impl InvoiceFilter {
    pub fn issued_by(issuer_id: BusinessId) -> Self {
        Self {
            issuer_id: Some(issuer_id),
            status_id: None,
        }
    }

    pub fn with_status(mut self, status_id: Option<InvoiceStatusId>) -> Self {
        self.status_id = status_id;
        self
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.issuer_id.is_none_or(|id| invoice.issuer_id() == id)
            && self.status_id.is_none_or(|id| invoice.status_id() == id)
    }
}

/// Change applied to a stored invoice while the store holds it exclusively.
///
/// It runs against the freshly loaded aggregate; returning an error leaves the
/// stored invoice untouched.
pub type InvoiceMutation<'a> = Box<dyn FnOnce(&mut InvoiceWithItems) -> DomainResult<()> + Send + 'a>;

/// Tenants, users, businesses and bank accounts.
#[async_trait]
pub trait PartyStore: Send + Sync {
    async fn insert_tenant(&self, tenant: Tenant) -> StoreResult<Tenant>;

    /// Persist `name`, `has_paid` and `is_admin`. The stored issuer business
    /// is kept whatever `tenant` carries; the returned row is the stored one.
    async fn update_tenant(&self, tenant: Tenant) -> StoreResult<Tenant>;

    /// Make `business_id` the tenant's issuer unless it already has one, in
    /// one atomic step. Returns the tenant as stored afterwards.
    async fn assign_issuer_if_unset(
        &self,
        tenant_id: TenantId,
        business_id: BusinessId,
        at: DateTime<Utc>,
    ) -> StoreResult<Tenant>;

    async fn tenant(&self, id: TenantId) -> StoreResult<Option<Tenant>>;
    async fn tenants(&self) -> StoreResult<Vec<Tenant>>;
    async fn tenant_by_issuer(&self, business_id: BusinessId) -> StoreResult<Option<Tenant>>;

    /// Deletes the tenant with its users and businesses (and everything the
    /// businesses own).
    async fn delete_tenant(&self, id: TenantId) -> StoreResult<()>;

    async fn insert_user(&self, user: User) -> StoreResult<User>;
    async fn update_user(&self, user: User) -> StoreResult<User>;
    async fn user(&self, id: UserId) -> StoreResult<Option<User>>;
    /// Exact match on the normalized email.
    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn user_by_verification_token(&self, token: &str) -> StoreResult<Option<User>>;
    async fn user_by_remember_me_token(&self, token: &str) -> StoreResult<Option<User>>;
    /// Users of one tenant, or of every tenant when `tenant_id` is `None`.
    async fn users(&self, tenant_id: Option<TenantId>) -> StoreResult<Vec<User>>;
    async fn delete_user(&self, id: UserId) -> StoreResult<()>;

    async fn insert_business(&self, business: Business) -> StoreResult<Business>;
    async fn update_business(&self, business: Business) -> StoreResult<Business>;
    async fn business(&self, id: BusinessId) -> StoreResult<Option<Business>>;
    async fn businesses(&self, tenant_id: Option<TenantId>) -> StoreResult<Vec<Business>>;

    /// Rejected while the business is any tenant's issuer; otherwise cascades
    /// to its articles, bank accounts and invoices.
    async fn delete_business(&self, id: BusinessId) -> StoreResult<()>;

    async fn insert_bank_account(&self, account: BankAccount) -> StoreResult<BankAccount>;
    async fn update_bank_account(&self, account: BankAccount) -> StoreResult<BankAccount>;
    async fn bank_account(&self, id: BankAccountId) -> StoreResult<Option<BankAccount>>;
    async fn bank_accounts(&self, business_id: BusinessId) -> StoreResult<Vec<BankAccount>>;
    async fn delete_bank_account(&self, id: BankAccountId) -> StoreResult<()>;
}

/// Articles and the global tax and status lookups.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_article(&self, article: Article) -> StoreResult<Article>;
    async fn update_article(&self, article: Article) -> StoreResult<Article>;
    async fn article(&self, id: ArticleId) -> StoreResult<Option<Article>>;
    async fn articles(&self, business_id: BusinessId) -> StoreResult<Vec<Article>>;
    /// Invoice items that referenced the article keep their amounts.
    async fn delete_article(&self, id: ArticleId) -> StoreResult<()>;

    async fn insert_tax(&self, tax: Tax) -> StoreResult<Tax>;
    async fn update_tax(&self, tax: Tax) -> StoreResult<Tax>;
    async fn tax(&self, id: TaxId) -> StoreResult<Option<Tax>>;
    /// `None` looks up the exempted row.
    async fn tax_by_rate(&self, rate: Option<Decimal>) -> StoreResult<Option<Tax>>;
    async fn taxes(&self) -> StoreResult<Vec<Tax>>;
    async fn delete_tax(&self, id: TaxId) -> StoreResult<()>;

    async fn insert_status(&self, status: InvoiceStatus) -> StoreResult<InvoiceStatus>;
    async fn update_status(&self, status: InvoiceStatus) -> StoreResult<InvoiceStatus>;
    async fn status(&self, id: InvoiceStatusId) -> StoreResult<Option<InvoiceStatus>>;
    async fn status_by_code(&self, code: &str) -> StoreResult<Option<InvoiceStatus>>;
    async fn statuses(&self) -> StoreResult<Vec<InvoiceStatus>>;
    async fn delete_status(&self, id: InvoiceStatusId) -> StoreResult<()>;
}

/// Invoices with their items.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// `(issuer, invoice_number)` is unique; a clash is reported as
    /// [`StoreError::UniqueViolation`] so the caller can retry with another
    /// number.
    async fn insert_invoice(&self, aggregate: &InvoiceWithItems) -> StoreResult<()>;

    /// Load, mutate and write back one invoice with no other writer in
    /// between. Items the mutation dropped are deleted. Unknown invoices are
    /// `NotFound`.
    async fn mutate_invoice(&self, id: InvoiceId, mutation: InvoiceMutation<'_>) -> DomainResult<InvoiceWithItems>;

    /// Invoice with its items, ordered by `sort_order`.
    async fn load_invoice(&self, id: InvoiceId) -> DomainResult<Option<InvoiceWithItems>>;

    /// Headers matching `filter`, newest first.
    async fn invoices(&self, filter: &InvoiceFilter) -> StoreResult<Vec<Invoice>>;

    /// Number of the issuer's most recently created invoice.
    async fn last_invoice_number(&self, issuer_id: BusinessId) -> StoreResult<Option<InvoiceNumber>>;

    async fn delete_invoice(&self, id: InvoiceId) -> StoreResult<()>;
}

/// Everything the back office needs from storage.
#[async_trait]
pub trait BackOfficeStore: PartyStore + CatalogStore + InvoiceStore {
    async fn next_id(&self, sequence: Sequence) -> StoreResult<i64>;
}

/// Rates of the default tax rows; `None` is the exempted row.
pub fn default_tax_rates() -> impl Iterator<Item = Option<Decimal>> {
    std::iter::once(None).chain(ALLOWED_RATES.iter().map(|r| Some(Decimal::from(*r))))
}

/// Insert the default taxes and invoice statuses that are not there yet.
pub async fn seed_defaults(store: &dyn BackOfficeStore) -> DomainResult<()> {
    let now = Utc::now();
    for rate in default_tax_rates() {
        if store.tax_by_rate(rate).await?.is_some() {
            continue;
        }
        let tax = Tax::create(TaxId::new(store.next_id(Sequence::Tax).await?), TaxDraft { rate, name: None }, now)?;
        tolerate_duplicate(store.insert_tax(tax).await.map(|_| ()))?;
    }
    for code in DEFAULT_CODES {
        if store.status_by_code(code).await?.is_some() {
            continue;
        }
        let status = InvoiceStatus::create(
            InvoiceStatusId::new(store.next_id(Sequence::InvoiceStatus).await?),
            InvoiceStatusDraft {
                code: code.to_string(),
            },
            now,
        )?;
        tolerate_duplicate(store.insert_status(status).await.map(|_| ()))?;
    }
    tracing::debug!("default taxes and statuses present");
    Ok(())
}

/// Another instance seeding at the same time is fine.
fn tolerate_duplicate(result: StoreResult<()>) -> StoreResult<()> {
    match result {
        Err(StoreError::UniqueViolation(_)) => Ok(()),
        other => other,
    }
}

//! In-memory relational store.
//!
//! One table per entity, keyed by id, behind a single `RwLock` so that a
//! cascade (tenant -> businesses -> invoices -> items) and an invoice
//! read-modify-write are each applied atomically.

mod catalog;
mod invoices;
mod parties;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use invoicer_auth::User;
use invoicer_catalog::Article;
use invoicer_core::{
    ArticleId, BankAccountId, BusinessId, Decimal, DomainResult, Entity, InvoiceId, InvoiceItemId, InvoiceStatusId,
    TaxId, TenantId, UserId,
};
use invoicer_invoicing::{
    Invoice, InvoiceItem, InvoiceNumber, InvoiceStatus, InvoiceStatusDraft, InvoiceWithItems, Tax, TaxDraft,
    status::DEFAULT_CODES,
};
use invoicer_parties::{BankAccount, Business, Tenant};

use super::{
    BackOfficeStore, CatalogStore, InvoiceFilter, InvoiceMutation, InvoiceStore, PartyStore, Sequence, StoreError,
    StoreResult, default_tax_rates,
};

#[derive(Debug, Default)]
struct Tables {
    tenants: BTreeMap<TenantId, Tenant>,
    users: BTreeMap<UserId, User>,
    businesses: BTreeMap<BusinessId, Business>,
    bank_accounts: BTreeMap<BankAccountId, BankAccount>,
    articles: BTreeMap<ArticleId, Article>,
    taxes: BTreeMap<TaxId, Tax>,
    statuses: BTreeMap<InvoiceStatusId, InvoiceStatus>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    items: BTreeMap<InvoiceItemId, InvoiceItem>,
}

/// Per-table id sequences. Ids start at 1 and are never reused.
#[derive(Debug)]
struct Sequences {
    tenant: AtomicI64,
    user: AtomicI64,
    business: AtomicI64,
    bank_account: AtomicI64,
    article: AtomicI64,
    tax: AtomicI64,
    status: AtomicI64,
    invoice: AtomicI64,
    item: AtomicI64,
}

impl Default for Sequences {
    fn default() -> Self {
        Self {
            tenant: AtomicI64::new(1),
            user: AtomicI64::new(1),
            business: AtomicI64::new(1),
            bank_account: AtomicI64::new(1),
            article: AtomicI64::new(1),
            tax: AtomicI64::new(1),
            status: AtomicI64::new(1),
            invoice: AtomicI64::new(1),
            item: AtomicI64::new(1),
        }
    }
}

fn next(seq: &AtomicI64) -> i64 {
    seq.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    ids: Sequences,
}

impl InMemoryStore {
    /// Empty store, no lookup rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the default taxes (exempted, 0%, 8%, 19%) and the
    /// default invoice status codes.
    pub fn with_defaults() -> DomainResult<Self> {
        let store = Self::new();
        let now = Utc::now();

        for rate in default_tax_rates() {
            let tax = Tax::create(store.next_tax_id(), TaxDraft { rate, name: None }, now)?;
            store.insert_tax(tax)?;
        }
        for code in DEFAULT_CODES {
            let status = InvoiceStatus::create(
                store.next_status_id(),
                InvoiceStatusDraft {
                    code: code.to_string(),
                },
                now,
            )?;
            store.insert_status(status)?;
        }

        tracing::debug!("store seeded with default taxes and statuses");
        Ok(store)
    }

    pub fn next_id(&self, sequence: Sequence) -> i64 {
        let seq = match sequence {
            Sequence::Tenant => &self.ids.tenant,
            Sequence::User => &self.ids.user,
            Sequence::Business => &self.ids.business,
            Sequence::BankAccount => &self.ids.bank_account,
            Sequence::Article => &self.ids.article,
            Sequence::Tax => &self.ids.tax,
            Sequence::InvoiceStatus => &self.ids.status,
            Sequence::Invoice => &self.ids.invoice,
            Sequence::InvoiceItem => &self.ids.item,
        };
        next(seq)
    }

    pub fn next_tenant_id(&self) -> TenantId {
        TenantId::new(next(&self.ids.tenant))
    }

    pub fn next_user_id(&self) -> UserId {
        UserId::new(next(&self.ids.user))
    }

    pub fn next_business_id(&self) -> BusinessId {
        BusinessId::new(next(&self.ids.business))
    }

    pub fn next_bank_account_id(&self) -> BankAccountId {
        BankAccountId::new(next(&self.ids.bank_account))
    }

    pub fn next_article_id(&self) -> ArticleId {
        ArticleId::new(next(&self.ids.article))
    }

    pub fn next_tax_id(&self) -> TaxId {
        TaxId::new(next(&self.ids.tax))
    }

    pub fn next_status_id(&self) -> InvoiceStatusId {
        InvoiceStatusId::new(next(&self.ids.status))
    }

    pub fn next_invoice_id(&self) -> InvoiceId {
        InvoiceId::new(next(&self.ids.invoice))
    }

    pub fn next_item_id(&self) -> InvoiceItemId {
        InvoiceItemId::new(next(&self.ids.item))
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::Poisoned)
    }
}

fn missing(what: &str, id: impl core::fmt::Display) -> StoreError {
    StoreError::Missing(format!("{what} {id}"))
}

impl Tables {
    /// Remove an invoice and its items.
    fn delete_invoice_cascade(&mut self, invoice_id: InvoiceId) {
        self.invoices.remove(&invoice_id);
        self.items.retain(|_, item| item.invoice_id() != invoice_id);
    }

    /// Remove a business with everything hanging off it: articles (items keep
    /// their amounts and lose the link), bank accounts and every invoice it
    /// issued or received.
    fn delete_business_cascade(&mut self, business_id: BusinessId) {
        let now = Utc::now();
        let articles: Vec<ArticleId> = self
            .articles
            .values()
            .filter(|a| a.business_id() == business_id)
            .map(|a| a.id())
            .collect();
        for article_id in articles {
            self.delete_article_set_null(article_id, now);
        }

        self.bank_accounts.retain(|_, a| a.business_id() != business_id);

        let invoices: Vec<InvoiceId> = self
            .invoices
            .values()
            .filter(|i| i.issuer_id() == business_id || i.receiver_id() == business_id)
            .map(|i| i.id())
            .collect();
        for invoice_id in invoices {
            self.delete_invoice_cascade(invoice_id);
        }

        self.businesses.remove(&business_id);
    }

    fn delete_article_set_null(&mut self, article_id: ArticleId, now: DateTime<Utc>) {
        self.articles.remove(&article_id);
        for item in self.items.values_mut().filter(|i| i.article_id() == Some(article_id)) {
            item.detach_article(now);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Async boundary
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PartyStore for InMemoryStore {
    async fn insert_tenant(&self, tenant: Tenant) -> StoreResult<Tenant> {
        InMemoryStore::insert_tenant(self, tenant)
    }

    async fn update_tenant(&self, tenant: Tenant) -> StoreResult<Tenant> {
        InMemoryStore::update_tenant(self, tenant)
    }

    async fn assign_issuer_if_unset(
        &self,
        tenant_id: TenantId,
        business_id: BusinessId,
        at: DateTime<Utc>,
    ) -> StoreResult<Tenant> {
        InMemoryStore::assign_issuer_if_unset(self, tenant_id, business_id, at)
    }

    async fn tenant(&self, id: TenantId) -> StoreResult<Option<Tenant>> {
        InMemoryStore::tenant(self, id)
    }

    async fn tenants(&self) -> StoreResult<Vec<Tenant>> {
        InMemoryStore::tenants(self)
    }

    async fn tenant_by_issuer(&self, business_id: BusinessId) -> StoreResult<Option<Tenant>> {
        InMemoryStore::tenant_by_issuer(self, business_id)
    }

    async fn delete_tenant(&self, id: TenantId) -> StoreResult<()> {
        InMemoryStore::delete_tenant(self, id)
    }

    async fn insert_user(&self, user: User) -> StoreResult<User> {
        InMemoryStore::insert_user(self, user)
    }

    async fn update_user(&self, user: User) -> StoreResult<User> {
        InMemoryStore::update_user(self, user)
    }

    async fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        InMemoryStore::user(self, id)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        InMemoryStore::user_by_email(self, email)
    }

    async fn user_by_verification_token(&self, token: &str) -> StoreResult<Option<User>> {
        InMemoryStore::user_by_verification_token(self, token)
    }

    async fn user_by_remember_me_token(&self, token: &str) -> StoreResult<Option<User>> {
        InMemoryStore::user_by_remember_me_token(self, token)
    }

    async fn users(&self, tenant_id: Option<TenantId>) -> StoreResult<Vec<User>> {
        InMemoryStore::users(self, tenant_id)
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<()> {
        InMemoryStore::delete_user(self, id)
    }

    async fn insert_business(&self, business: Business) -> StoreResult<Business> {
        InMemoryStore::insert_business(self, business)
    }

    async fn update_business(&self, business: Business) -> StoreResult<Business> {
        InMemoryStore::update_business(self, business)
    }

    async fn business(&self, id: BusinessId) -> StoreResult<Option<Business>> {
        InMemoryStore::business(self, id)
    }

    async fn businesses(&self, tenant_id: Option<TenantId>) -> StoreResult<Vec<Business>> {
        InMemoryStore::businesses(self, tenant_id)
    }

    async fn delete_business(&self, id: BusinessId) -> StoreResult<()> {
        InMemoryStore::delete_business(self, id)
    }

    async fn insert_bank_account(&self, account: BankAccount) -> StoreResult<BankAccount> {
        InMemoryStore::insert_bank_account(self, account)
    }

    async fn update_bank_account(&self, account: BankAccount) -> StoreResult<BankAccount> {
        InMemoryStore::update_bank_account(self, account)
    }

    async fn bank_account(&self, id: BankAccountId) -> StoreResult<Option<BankAccount>> {
        InMemoryStore::bank_account(self, id)
    }

    async fn bank_accounts(&self, business_id: BusinessId) -> StoreResult<Vec<BankAccount>> {
        InMemoryStore::bank_accounts(self, business_id)
    }

    async fn delete_bank_account(&self, id: BankAccountId) -> StoreResult<()> {
        InMemoryStore::delete_bank_account(self, id)
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_article(&self, article: Article) -> StoreResult<Article> {
        InMemoryStore::insert_article(self, article)
    }

    async fn update_article(&self, article: Article) -> StoreResult<Article> {
        InMemoryStore::update_article(self, article)
    }

    async fn article(&self, id: ArticleId) -> StoreResult<Option<Article>> {
        InMemoryStore::article(self, id)
    }

    async fn articles(&self, business_id: BusinessId) -> StoreResult<Vec<Article>> {
        InMemoryStore::articles(self, business_id)
    }

    async fn delete_article(&self, id: ArticleId) -> StoreResult<()> {
        InMemoryStore::delete_article(self, id)
    }

    async fn insert_tax(&self, tax: Tax) -> StoreResult<Tax> {
        InMemoryStore::insert_tax(self, tax)
    }

    async fn update_tax(&self, tax: Tax) -> StoreResult<Tax> {
        InMemoryStore::update_tax(self, tax)
    }

    async fn tax(&self, id: TaxId) -> StoreResult<Option<Tax>> {
        InMemoryStore::tax(self, id)
    }

    async fn tax_by_rate(&self, rate: Option<Decimal>) -> StoreResult<Option<Tax>> {
        InMemoryStore::tax_by_rate(self, rate)
    }

    async fn taxes(&self) -> StoreResult<Vec<Tax>> {
        InMemoryStore::taxes(self)
    }

    async fn delete_tax(&self, id: TaxId) -> StoreResult<()> {
        InMemoryStore::delete_tax(self, id)
    }

    async fn insert_status(&self, status: InvoiceStatus) -> StoreResult<InvoiceStatus> {
        InMemoryStore::insert_status(self, status)
    }

    async fn update_status(&self, status: InvoiceStatus) -> StoreResult<InvoiceStatus> {
        InMemoryStore::update_status(self, status)
    }

    async fn status(&self, id: InvoiceStatusId) -> StoreResult<Option<InvoiceStatus>> {
        InMemoryStore::status(self, id)
    }

    async fn status_by_code(&self, code: &str) -> StoreResult<Option<InvoiceStatus>> {
        InMemoryStore::status_by_code(self, code)
    }

    async fn statuses(&self) -> StoreResult<Vec<InvoiceStatus>> {
        InMemoryStore::statuses(self)
    }

    async fn delete_status(&self, id: InvoiceStatusId) -> StoreResult<()> {
        InMemoryStore::delete_status(self, id)
    }
}

#[async_trait]
impl InvoiceStore for InMemoryStore {
    async fn insert_invoice(&self, aggregate: &InvoiceWithItems) -> StoreResult<()> {
        InMemoryStore::insert_invoice(self, aggregate)
    }

    async fn mutate_invoice(&self, id: InvoiceId, mutation: InvoiceMutation<'_>) -> DomainResult<InvoiceWithItems> {
        InMemoryStore::mutate_invoice(self, id, mutation)
    }

    async fn load_invoice(&self, id: InvoiceId) -> DomainResult<Option<InvoiceWithItems>> {
        InMemoryStore::load_invoice(self, id)
    }

    async fn invoices(&self, filter: &InvoiceFilter) -> StoreResult<Vec<Invoice>> {
        InMemoryStore::invoices(self, filter)
    }

    async fn last_invoice_number(&self, issuer_id: BusinessId) -> StoreResult<Option<InvoiceNumber>> {
        InMemoryStore::last_invoice_number(self, issuer_id)
    }

    async fn delete_invoice(&self, id: InvoiceId) -> StoreResult<()> {
        InMemoryStore::delete_invoice(self, id)
    }
}

#[async_trait]
impl BackOfficeStore for InMemoryStore {
    async fn next_id(&self, sequence: Sequence) -> StoreResult<i64> {
        Ok(InMemoryStore::next_id(self, sequence))
    }
}

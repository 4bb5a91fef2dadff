//! Businesses with their logos, bank accounts and articles.

use invoicer_auth::{AccessRequest, Action, Actor, ResourceKind, Scope};
use invoicer_catalog::{Article, ArticleDraft, ArticlePatch};
use invoicer_core::{ArticleId, BankAccountId, BusinessId, DomainError, DomainResult, Entity, TenantId};
use invoicer_parties::{
    BankAccount, BankAccountDraft, BankAccountPatch, Business, BusinessDraft, BusinessPatch, logo_path, validate_logo,
};

use invoicer_infra::{CatalogStore, PartyStore, Sequence};

use super::{BackOffice, best_effort, check, now};

impl BackOffice {
    pub async fn list_businesses(&self, actor: &Actor) -> DomainResult<Vec<Business>> {
        let scope = Self::listing_scope(actor);
        check(actor, AccessRequest::new(Action::Read, ResourceKind::Business, scope))?;
        let filter = match scope {
            Scope::Tenant(id) => Some(id),
            _ => None,
        };
        Ok(self.store.businesses(filter).await?)
    }

    pub async fn get_business(&self, actor: &Actor, id: BusinessId) -> DomainResult<Business> {
        self.business_for(actor, id, Action::Read, ResourceKind::Business).await
    }

    /// Businesses the caller may invoice: its tenant's businesses except the
    /// issuer itself.
    pub async fn receivers(&self, actor: &Actor) -> DomainResult<Vec<Business>> {
        check(actor, AccessRequest::read(ResourceKind::Business, actor.tenant_id))?;
        let tenant = self.load_tenant(actor.tenant_id).await?;
        Ok(self
            .store
            .businesses(Some(tenant.id()))
            .await?
            .into_iter()
            .filter(|b| !tenant.is_issuer(b.id()))
            .collect())
    }

    /// Create a business in `tenant_id` (default: the caller's tenant). The
    /// first business of a tenant without an issuer becomes its issuer.
    #[tracing::instrument(skip(self, actor, draft), fields(user_id = %actor.user_id))]
    pub async fn create_business(
        &self,
        actor: &Actor,
        tenant_id: Option<TenantId>,
        draft: BusinessDraft,
    ) -> DomainResult<Business> {
        let tenant_id = tenant_id.unwrap_or(actor.tenant_id);
        check(actor, AccessRequest::write(Action::Create, ResourceKind::Business, tenant_id))?;
        let tenant = self.load_tenant(tenant_id).await?;

        let at = now();
        let business = Business::create(self.next_id(Sequence::Business).await?, tenant_id, actor.user_id, draft, at)?;
        let business = self.store.insert_business(business).await?;
        if tenant.issuer_business_id().is_none() {
            let tenant = self.store.assign_issuer_if_unset(tenant_id, business.id(), at).await?;
            if tenant.is_issuer(business.id()) {
                tracing::info!(business_id = %business.id(), "business became the tenant issuer");
            }
        }
        tracing::info!(business_id = %business.id(), tenant_id = %tenant_id, "business created");
        Ok(business)
    }

    #[tracing::instrument(skip(self, actor, patch), fields(user_id = %actor.user_id))]
    pub async fn update_business(&self, actor: &Actor, id: BusinessId, patch: BusinessPatch) -> DomainResult<Business> {
        let mut business = self.business_for(actor, id, Action::Update, ResourceKind::Business).await?;
        business.apply(patch, now())?;
        Ok(self.store.update_business(business).await?)
    }

    /// Delete a business. Issuer businesses cannot be deleted.
    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete_business(&self, actor: &Actor, id: BusinessId) -> DomainResult<()> {
        let business = self.business_for(actor, id, Action::Delete, ResourceKind::Business).await?;
        self.store.delete_business(id).await?;
        if let Some(path) = business.logo() {
            best_effort("logo removal", self.logos.delete(path)).await;
        }
        tracing::info!(business_id = %id, "business deleted");
        Ok(())
    }

    /// Store a new logo and drop the previous file.
    #[tracing::instrument(skip(self, actor, bytes), fields(user_id = %actor.user_id, size = bytes.len()))]
    pub async fn upload_logo(
        &self,
        actor: &Actor,
        id: BusinessId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> DomainResult<Business> {
        let mut business = self.business_for(actor, id, Action::Update, ResourceKind::Business).await?;
        let ext = validate_logo(file_name, bytes.len() as u64, self.config.logo_max_bytes)?;

        let at = now();
        let path = logo_path(id, at, &ext);
        self.logos.put(&path, bytes).await?;

        let previous = business.set_logo(Some(path.clone()), at);
        let business = self.store.update_business(business).await?;
        if let Some(old) = previous.filter(|old| *old != path) {
            best_effort("old logo removal", self.logos.delete(&old)).await;
        }
        tracing::info!(business_id = %id, logo = %path, "logo uploaded");
        Ok(business)
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn remove_logo(&self, actor: &Actor, id: BusinessId) -> DomainResult<Business> {
        let mut business = self.business_for(actor, id, Action::Update, ResourceKind::Business).await?;
        let previous = business.set_logo(None, now());
        let business = self.store.update_business(business).await?;
        if let Some(old) = previous {
            best_effort("logo removal", self.logos.delete(&old)).await;
        }
        Ok(business)
    }

    // ── bank accounts ───────────────────────────────────────────────────────

    pub async fn list_bank_accounts(&self, actor: &Actor, business_id: BusinessId) -> DomainResult<Vec<BankAccount>> {
        self.business_for(actor, business_id, Action::Read, ResourceKind::BankAccount).await?;
        Ok(self.store.bank_accounts(business_id).await?)
    }

    pub async fn get_bank_account(
        &self,
        actor: &Actor,
        business_id: BusinessId,
        id: BankAccountId,
    ) -> DomainResult<BankAccount> {
        self.business_for(actor, business_id, Action::Read, ResourceKind::BankAccount).await?;
        self.load_bank_account(business_id, id).await
    }

    pub async fn create_bank_account(
        &self,
        actor: &Actor,
        business_id: BusinessId,
        draft: BankAccountDraft,
    ) -> DomainResult<BankAccount> {
        self.business_for(actor, business_id, Action::Create, ResourceKind::BankAccount).await?;
        let account = BankAccount::create(self.next_id(Sequence::BankAccount).await?, business_id, draft, now())?;
        let account = self.store.insert_bank_account(account).await?;
        tracing::info!(business_id = %business_id, bank_account_id = %account.id(), "bank account created");
        Ok(account)
    }

    pub async fn update_bank_account(
        &self,
        actor: &Actor,
        business_id: BusinessId,
        id: BankAccountId,
        patch: BankAccountPatch,
    ) -> DomainResult<BankAccount> {
        self.business_for(actor, business_id, Action::Update, ResourceKind::BankAccount).await?;
        let mut account = self.load_bank_account(business_id, id).await?;
        account.apply(patch, now())?;
        Ok(self.store.update_bank_account(account).await?)
    }

    pub async fn delete_bank_account(&self, actor: &Actor, business_id: BusinessId, id: BankAccountId) -> DomainResult<()> {
        self.business_for(actor, business_id, Action::Delete, ResourceKind::BankAccount).await?;
        self.load_bank_account(business_id, id).await?;
        self.store.delete_bank_account(id).await?;
        tracing::info!(business_id = %business_id, bank_account_id = %id, "bank account deleted");
        Ok(())
    }

    async fn load_bank_account(&self, business_id: BusinessId, id: BankAccountId) -> DomainResult<BankAccount> {
        self.store
            .bank_account(id)
            .await?
            .filter(|a| a.business_id() == business_id)
            .ok_or_else(|| DomainError::not_found("Bank account not found"))
    }

    // ── articles ────────────────────────────────────────────────────────────

    pub async fn list_articles(&self, actor: &Actor, business_id: BusinessId) -> DomainResult<Vec<Article>> {
        self.business_for(actor, business_id, Action::Read, ResourceKind::Article).await?;
        Ok(self.store.articles(business_id).await?)
    }

    pub async fn get_article(&self, actor: &Actor, business_id: BusinessId, id: ArticleId) -> DomainResult<Article> {
        self.business_for(actor, business_id, Action::Read, ResourceKind::Article).await?;
        self.load_article(business_id, id).await
    }

    pub async fn create_article(&self, actor: &Actor, business_id: BusinessId, draft: ArticleDraft) -> DomainResult<Article> {
        self.business_for(actor, business_id, Action::Create, ResourceKind::Article).await?;
        let article = Article::create(self.next_id(Sequence::Article).await?, business_id, draft, now())?;
        let article = self.store.insert_article(article).await?;
        tracing::info!(business_id = %business_id, article_id = %article.id(), "article created");
        Ok(article)
    }

    pub async fn update_article(
        &self,
        actor: &Actor,
        business_id: BusinessId,
        id: ArticleId,
        patch: ArticlePatch,
    ) -> DomainResult<Article> {
        self.business_for(actor, business_id, Action::Update, ResourceKind::Article).await?;
        let mut article = self.load_article(business_id, id).await?;
        article.apply(patch, now())?;
        Ok(self.store.update_article(article).await?)
    }

    /// Invoice lines that used the article keep their amounts.
    pub async fn delete_article(&self, actor: &Actor, business_id: BusinessId, id: ArticleId) -> DomainResult<()> {
        self.business_for(actor, business_id, Action::Delete, ResourceKind::Article).await?;
        self.load_article(business_id, id).await?;
        self.store.delete_article(id).await?;
        tracing::info!(business_id = %business_id, article_id = %id, "article deleted");
        Ok(())
    }

    async fn load_article(&self, business_id: BusinessId, id: ArticleId) -> DomainResult<Article> {
        self.store
            .article(id)
            .await?
            .filter(|a| a.belongs_to(business_id))
            .ok_or_else(|| DomainError::not_found("Article not found"))
    }
}

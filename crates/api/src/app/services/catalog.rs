//! Global lookups: taxes and invoice statuses.

use invoicer_auth::{AccessRequest, Action, Actor, ResourceKind};
use invoicer_core::{DomainError, DomainResult, Entity, InvoiceStatusId, TaxId};
use invoicer_invoicing::{InvoiceStatus, InvoiceStatusDraft, Tax, TaxDraft, TaxPatch};

use invoicer_infra::{CatalogStore, Sequence};

use super::{BackOffice, check, now};

impl BackOffice {
    pub async fn list_taxes(&self, actor: &Actor) -> DomainResult<Vec<Tax>> {
        check(actor, AccessRequest::global(Action::Read, ResourceKind::Tax))?;
        Ok(self.store.taxes().await?)
    }

    pub async fn get_tax(&self, actor: &Actor, id: TaxId) -> DomainResult<Tax> {
        check(actor, AccessRequest::global(Action::Read, ResourceKind::Tax))?;
        self.load_tax(id).await
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn create_tax(&self, actor: &Actor, draft: TaxDraft) -> DomainResult<Tax> {
        check(actor, AccessRequest::global(Action::Create, ResourceKind::Tax))?;
        let tax = Tax::create(self.next_id(Sequence::Tax).await?, draft, now())?;
        let tax = self.store.insert_tax(tax).await?;
        tracing::info!(tax_id = %tax.id(), name = tax.name(), "tax created");
        Ok(tax)
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn update_tax(&self, actor: &Actor, id: TaxId, patch: TaxPatch) -> DomainResult<Tax> {
        check(actor, AccessRequest::global(Action::Update, ResourceKind::Tax))?;
        let mut tax = self.load_tax(id).await?;
        tax.apply(patch, now())?;
        Ok(self.store.update_tax(tax).await?)
    }

    /// Rejected while invoice lines still use the tax.
    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete_tax(&self, actor: &Actor, id: TaxId) -> DomainResult<()> {
        check(actor, AccessRequest::global(Action::Delete, ResourceKind::Tax))?;
        self.load_tax(id).await?;
        self.store.delete_tax(id).await?;
        tracing::info!(tax_id = %id, "tax deleted");
        Ok(())
    }

    async fn load_tax(&self, id: TaxId) -> DomainResult<Tax> {
        self.store
            .tax(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Tax not found"))
    }

    pub async fn list_statuses(&self, actor: &Actor) -> DomainResult<Vec<InvoiceStatus>> {
        check(actor, AccessRequest::global(Action::Read, ResourceKind::InvoiceStatus))?;
        Ok(self.store.statuses().await?)
    }

    pub async fn get_status(&self, actor: &Actor, id: InvoiceStatusId) -> DomainResult<InvoiceStatus> {
        check(actor, AccessRequest::global(Action::Read, ResourceKind::InvoiceStatus))?;
        self.load_status(id).await
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn create_status(&self, actor: &Actor, draft: InvoiceStatusDraft) -> DomainResult<InvoiceStatus> {
        check(actor, AccessRequest::global(Action::Create, ResourceKind::InvoiceStatus))?;
        let status = InvoiceStatus::create(self.next_id(Sequence::InvoiceStatus).await?, draft, now())?;
        let status = self.store.insert_status(status).await?;
        tracing::info!(status_id = %status.id(), code = status.code(), "invoice status created");
        Ok(status)
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn rename_status(&self, actor: &Actor, id: InvoiceStatusId, code: &str) -> DomainResult<InvoiceStatus> {
        check(actor, AccessRequest::global(Action::Update, ResourceKind::InvoiceStatus))?;
        let mut status = self.load_status(id).await?;
        status.rename(code, now())?;
        Ok(self.store.update_status(status).await?)
    }

    /// Rejected while invoices still carry the status.
    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete_status(&self, actor: &Actor, id: InvoiceStatusId) -> DomainResult<()> {
        check(actor, AccessRequest::global(Action::Delete, ResourceKind::InvoiceStatus))?;
        self.load_status(id).await?;
        self.store.delete_status(id).await?;
        tracing::info!(status_id = %id, "invoice status deleted");
        Ok(())
    }

    async fn load_status(&self, id: InvoiceStatusId) -> DomainResult<InvoiceStatus> {
        self.store
            .status(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Invoice status not found"))
    }
}

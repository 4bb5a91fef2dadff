//! Invoices, their items and the printable / spreadsheet renditions.
//!
//! Every item mutation runs inside the store's `mutate_invoice`: the invoice
//! is loaded, changed through [`InvoiceWithItems`] (which re-aggregates the
//! totals) and written back with no other writer in between, so a stored
//! invoice always agrees with its items. Everything the change needs from
//! other tables (taxes, articles, statuses, fresh ids) is resolved first.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use invoicer_auth::{AccessRequest, Action, Actor, ResourceKind, Scope, authorize_issuer};
use invoicer_core::{
    ArticleId, BusinessId, Decimal, DomainError, DomainResult, Entity, InvoiceId, InvoiceItemId, InvoiceStatusId,
    TaxId,
};
use invoicer_infra::{CatalogStore, InvoiceFilter, InvoiceStore, PartyStore, Sequence};
use invoicer_infra::external::{InvoiceDocument, RenderedFile};
use invoicer_invoicing::status::DEFAULT_CODE;
use invoicer_invoicing::{
    Invoice, InvoiceDraft, InvoiceItem, InvoicePatch, InvoiceSheetRow, InvoiceWithItems, ItemDraft, ItemPatch, Tax,
};
use invoicer_parties::Business;

use super::{BackOffice, check, now};

fn issuer_changed() -> DomainError {
    DomainError::conflict("Invoice issuer changed while the request was processed, retry")
}

/// How a caller names the tax of a line: by row id or by rate (`None` is
/// the exempted row).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxRef {
    Id(TaxId),
    Rate(Option<Decimal>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInput {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub article_id: Option<ArticleId>,
    /// `None` leaves the line untaxed.
    pub tax: Option<TaxRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatchInput {
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub article_id: Option<Option<ArticleId>>,
    /// `None` keeps the current tax.
    pub tax: Option<TaxRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceInput {
    pub receiver_id: Option<BusinessId>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    /// Status code; defaults to `draft`.
    pub status: Option<String>,
    pub items: Vec<ItemInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceUpdate {
    pub issuer_id: Option<BusinessId>,
    pub receiver_id: Option<BusinessId>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<String>,
    /// `Some` replaces every item.
    pub items: Option<Vec<ItemInput>>,
}

/// A touched item together with the re-aggregated invoice header.
#[derive(Debug, Clone, Serialize)]
pub struct ItemChange {
    pub item: InvoiceItem,
    pub invoice: Invoice,
}

impl BackOffice {
    // ── invoices ────────────────────────────────────────────────────────────

    /// Invoices under a business. Admin tenants see every invoice; others see
    /// what the business issued.
    pub async fn list_invoices(
        &self,
        actor: &Actor,
        business_id: BusinessId,
        status: Option<&str>,
    ) -> DomainResult<Vec<Invoice>> {
        self.business_for(actor, business_id, Action::Read, ResourceKind::Invoice).await?;
        let filter = if actor.tenant_is_admin {
            InvoiceFilter::default()
        } else {
            InvoiceFilter::issued_by(business_id)
        };
        let filter = filter.with_status(self.status_filter(status).await?);
        Ok(self.store.invoices(&filter).await?)
    }

    /// Cross-tenant listing for admin tenants.
    pub async fn list_all_invoices(
        &self,
        actor: &Actor,
        business_id: Option<BusinessId>,
        status: Option<&str>,
    ) -> DomainResult<Vec<Invoice>> {
        check(actor, AccessRequest::new(Action::Read, ResourceKind::Invoice, Scope::AllTenants))?;
        let filter = InvoiceFilter {
            issuer_id: business_id,
            status_id: self.status_filter(status).await?,
        };
        Ok(self.store.invoices(&filter).await?)
    }

    pub async fn get_invoice(
        &self,
        actor: &Actor,
        business_id: BusinessId,
        invoice_id: InvoiceId,
    ) -> DomainResult<InvoiceWithItems> {
        self.business_for(actor, business_id, Action::Read, ResourceKind::Invoice).await?;
        let aggregate = self.store.load_invoice(invoice_id).await?;
        if actor.tenant_is_admin {
            return aggregate.ok_or_else(|| DomainError::not_found("Invoice not found"));
        }
        aggregate
            .filter(|a| a.invoice().issuer_id() == business_id)
            .ok_or_else(|| DomainError::not_found("Invoice not found or you do not have access to this invoice"))
    }

    /// Create an invoice with its items under the next free number of the
    /// issuer. Regular tenants always issue from their own issuer business;
    /// admin tenants issue from the business in the path.
    #[tracing::instrument(skip(self, actor, input), fields(user_id = %actor.user_id, items = input.items.len()))]
    pub async fn create_invoice(
        &self,
        actor: &Actor,
        business_id: BusinessId,
        input: InvoiceInput,
    ) -> DomainResult<InvoiceWithItems> {
        let path_business = self
            .business_for(actor, business_id, Action::Read, ResourceKind::Invoice)
            .await?;
        let own_issuer = self.load_tenant(actor.tenant_id).await?.issuer_business_id();
        let issuer = if actor.tenant_is_admin {
            path_business
        } else {
            let id = own_issuer.ok_or_else(|| {
                DomainError::validation("issuer_id", "Tenant does not have an issuer business")
            })?;
            self.load_business(id).await?
        };
        authorize_issuer(actor, Action::Create, issuer.id(), issuer.tenant_id(), own_issuer)?;

        let receiver_id = input
            .receiver_id
            .ok_or_else(|| DomainError::validation("receiver_id", "Receiver business ID is required"))?;
        self.load_receiver(actor, receiver_id).await?;
        let invoice_date = input
            .invoice_date
            .ok_or_else(|| DomainError::validation("invoice_date", "Invoice date is required"))?;
        let due_date = input
            .due_date
            .ok_or_else(|| DomainError::validation("due_date", "Due date is required"))?;
        let status_id = self
            .resolve_status(input.status.as_deref().unwrap_or(DEFAULT_CODE))
            .await?;
        let lines = self.resolve_items(issuer.id(), input.items).await?;

        let draft = InvoiceDraft {
            issuer_id: issuer.id(),
            receiver_id,
            invoice_date,
            due_date,
            status_id,
        };
        let at = now();
        // A failed attempt writes nothing, so every attempt reuses these ids.
        let invoice_id: InvoiceId = self.next_id(Sequence::Invoice).await?;
        let items = self.build_items(invoice_id, &lines, at).await?;
        self.allocator
            .create_invoice(&*self.store, issuer.id(), move |number| {
                let header = Invoice::create(invoice_id, number, draft.clone(), at);
                InvoiceWithItems::new(header, items.clone())
            })
            .await
    }

    #[tracing::instrument(skip(self, actor, update), fields(user_id = %actor.user_id))]
    pub async fn update_invoice(
        &self,
        actor: &Actor,
        business_id: BusinessId,
        invoice_id: InvoiceId,
        update: InvoiceUpdate,
    ) -> DomainResult<InvoiceWithItems> {
        let current = self.get_invoice(actor, business_id, invoice_id).await?;
        let issuer = self.load_issuer(current.invoice().issuer_id()).await?;
        let own_issuer = self.load_tenant(actor.tenant_id).await?.issuer_business_id();
        authorize_issuer(actor, Action::Update, issuer.id(), issuer.tenant_id(), own_issuer)?;

        let mut patch = InvoicePatch::default();
        let mut effective_issuer = issuer.id();
        if let Some(new_issuer) = update.issuer_id.filter(|id| *id != issuer.id()) {
            if !actor.tenant_is_admin {
                return Err(DomainError::access_denied("You cannot change the issuer business"));
            }
            let target = self.load_issuer(new_issuer).await?;
            check(actor, AccessRequest::write(Action::Update, ResourceKind::Invoice, target.tenant_id()))?;
            patch.issuer_id = Some(new_issuer);
            effective_issuer = new_issuer;
        }
        if let Some(receiver_id) = update.receiver_id {
            self.load_receiver(actor, receiver_id).await?;
            patch.receiver_id = Some(receiver_id);
        }
        patch.invoice_date = update.invoice_date;
        patch.due_date = update.due_date;
        if let Some(code) = update.status.as_deref() {
            patch.status_id = Some(self.resolve_status(code).await?);
        }

        let at = now();
        let items = match update.items {
            Some(inputs) => {
                let lines = self.resolve_items(effective_issuer, inputs).await?;
                Some(self.build_items(invoice_id, &lines, at).await?)
            }
            None => None,
        };

        let expected_issuer = issuer.id();
        let aggregate = self
            .store
            .mutate_invoice(
                invoice_id,
                Box::new(move |aggregate: &mut InvoiceWithItems| {
                    if aggregate.invoice().issuer_id() != expected_issuer {
                        return Err(issuer_changed());
                    }
                    aggregate.apply(patch, at);
                    if let Some(items) = items {
                        aggregate.replace_items(items, at)?;
                    }
                    Ok(())
                }),
            )
            .await?;
        tracing::info!(invoice_id = %invoice_id, total = %aggregate.invoice().total(), "invoice updated");
        Ok(aggregate)
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete_invoice(
        &self,
        actor: &Actor,
        business_id: BusinessId,
        invoice_id: InvoiceId,
    ) -> DomainResult<()> {
        let aggregate = self.get_invoice(actor, business_id, invoice_id).await?;
        let issuer = self.load_issuer(aggregate.invoice().issuer_id()).await?;
        let own_issuer = self.load_tenant(actor.tenant_id).await?.issuer_business_id();
        authorize_issuer(actor, Action::Delete, issuer.id(), issuer.tenant_id(), own_issuer)?;
        self.store.delete_invoice(invoice_id).await?;
        tracing::info!(invoice_id = %invoice_id, "invoice deleted");
        Ok(())
    }

    // ── items ───────────────────────────────────────────────────────────────

    pub async fn list_items(&self, actor: &Actor, invoice_id: InvoiceId) -> DomainResult<Vec<InvoiceItem>> {
        let (aggregate, _) = self.invoice_for_items(actor, invoice_id, Action::Read).await?;
        Ok(aggregate.into_parts().1)
    }

    pub async fn get_item(
        &self,
        actor: &Actor,
        invoice_id: InvoiceId,
        item_id: InvoiceItemId,
    ) -> DomainResult<InvoiceItem> {
        let (aggregate, _) = self.invoice_for_items(actor, invoice_id, Action::Read).await?;
        aggregate.item(item_id).cloned()
    }

    /// Append a line at the end of the invoice.
    #[tracing::instrument(skip(self, actor, input), fields(user_id = %actor.user_id))]
    pub async fn add_item(&self, actor: &Actor, invoice_id: InvoiceId, input: ItemInput) -> DomainResult<ItemChange> {
        let (_, issuer) = self.invoice_for_items(actor, invoice_id, Action::Create).await?;
        let (draft, tax) = self.resolve_item(issuer.id(), input).await?;
        let at = now();
        // The position is assigned when the item is appended.
        let item = InvoiceItem::create(
            self.next_id(Sequence::InvoiceItem).await?,
            invoice_id,
            0,
            draft,
            tax.as_ref(),
            at,
        )?;
        let item_id = item.id();
        let issuer_id = issuer.id();

        let aggregate = self
            .store
            .mutate_invoice(
                invoice_id,
                Box::new(move |aggregate: &mut InvoiceWithItems| {
                    if aggregate.invoice().issuer_id() != issuer_id {
                        return Err(issuer_changed());
                    }
                    aggregate.add_item(item, at)?;
                    Ok(())
                }),
            )
            .await?;
        let item = aggregate.item(item_id)?.clone();
        tracing::info!(invoice_id = %invoice_id, item_id = %item_id, "invoice item added");
        Ok(ItemChange {
            item,
            invoice: aggregate.invoice().clone(),
        })
    }

    #[tracing::instrument(skip(self, actor, input), fields(user_id = %actor.user_id))]
    pub async fn update_item(
        &self,
        actor: &Actor,
        invoice_id: InvoiceId,
        item_id: InvoiceItemId,
        input: ItemPatchInput,
    ) -> DomainResult<ItemChange> {
        let (current, issuer) = self.invoice_for_items(actor, invoice_id, Action::Update).await?;
        let current_tax = current.item(item_id)?.tax_id();

        let keeps_tax = input.tax.is_none();
        let tax = match input.tax {
            Some(reference) => self.resolve_tax(reference).await?,
            None => match current_tax {
                Some(id) => self.store.tax(id).await?,
                None => None,
            },
        };
        if let Some(Some(article_id)) = input.article_id {
            self.check_article(issuer.id(), article_id).await?;
        }
        let patch = ItemPatch {
            description: input.description,
            quantity: input.quantity,
            unit_price: input.unit_price,
            article_id: input.article_id,
        };
        let at = now();
        let issuer_id = issuer.id();

        let aggregate = self
            .store
            .mutate_invoice(
                invoice_id,
                Box::new(move |aggregate: &mut InvoiceWithItems| {
                    if aggregate.invoice().issuer_id() != issuer_id {
                        return Err(issuer_changed());
                    }
                    if keeps_tax && aggregate.item(item_id)?.tax_id() != current_tax {
                        return Err(DomainError::conflict(
                            "Invoice item tax changed while the request was processed, retry",
                        ));
                    }
                    aggregate.update_item(item_id, patch, tax.as_ref(), at)?;
                    Ok(())
                }),
            )
            .await?;
        Ok(ItemChange {
            item: aggregate.item(item_id)?.clone(),
            invoice: aggregate.invoice().clone(),
        })
    }

    /// Remove a line; returns the re-aggregated header.
    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete_item(
        &self,
        actor: &Actor,
        invoice_id: InvoiceId,
        item_id: InvoiceItemId,
    ) -> DomainResult<Invoice> {
        self.invoice_for_items(actor, invoice_id, Action::Delete).await?;
        let at = now();
        let remove = move |aggregate: &mut InvoiceWithItems| aggregate.remove_item(item_id, at).map(|_| ());
        let aggregate = self.store.mutate_invoice(invoice_id, Box::new(remove)).await?;
        tracing::info!(invoice_id = %invoice_id, item_id = %item_id, "invoice item removed");
        Ok(aggregate.invoice().clone())
    }

    /// `order` must name every item of the invoice exactly once.
    #[tracing::instrument(skip(self, actor, order), fields(user_id = %actor.user_id))]
    pub async fn reorder_items(
        &self,
        actor: &Actor,
        invoice_id: InvoiceId,
        order: &[InvoiceItemId],
    ) -> DomainResult<InvoiceWithItems> {
        self.invoice_for_items(actor, invoice_id, Action::Update).await?;
        let at = now();
        let reorder = move |aggregate: &mut InvoiceWithItems| aggregate.reorder(order, at);
        self.store.mutate_invoice(invoice_id, Box::new(reorder)).await
    }

    // ── documents ───────────────────────────────────────────────────────────

    pub async fn invoice_pdf(
        &self,
        actor: &Actor,
        business_id: BusinessId,
        invoice_id: InvoiceId,
    ) -> DomainResult<RenderedFile> {
        let aggregate = self.get_invoice(actor, business_id, invoice_id).await?;
        let header = aggregate.invoice();
        let issuer = self.load_issuer(header.issuer_id()).await?;
        let receiver = self
            .store
            .business(header.receiver_id())
            .await?
            .ok_or_else(|| DomainError::not_found("Receiver business not found"))?;
        let bank_accounts = self.store.bank_accounts(issuer.id()).await?;
        let status = self.status_code(header.status_id()).await?;

        let document = InvoiceDocument::new(aggregate, issuer, receiver, bank_accounts, &status)?;
        self.pdf.render(&document).await
    }

    /// Spreadsheet of the invoices listed under a business.
    pub async fn export_invoices(
        &self,
        actor: &Actor,
        business_id: BusinessId,
        status: Option<&str>,
    ) -> DomainResult<RenderedFile> {
        let invoices = self.list_invoices(actor, business_id, status).await?;
        let rows = self.sheet_rows(&invoices).await?;
        self.sheets.export(&rows, now()).await
    }

    /// Cross-tenant spreadsheet for admin tenants.
    pub async fn export_all_invoices(
        &self,
        actor: &Actor,
        business_id: Option<BusinessId>,
        status: Option<&str>,
    ) -> DomainResult<RenderedFile> {
        let invoices = self.list_all_invoices(actor, business_id, status).await?;
        let rows = self.sheet_rows(&invoices).await?;
        self.sheets.export(&rows, now()).await
    }

    async fn sheet_rows(&self, invoices: &[Invoice]) -> DomainResult<Vec<InvoiceSheetRow>> {
        let names: HashMap<BusinessId, String> = self
            .store
            .businesses(None)
            .await?
            .into_iter()
            .map(|b| (b.id(), b.name().to_string()))
            .collect();
        let codes: HashMap<InvoiceStatusId, String> = self
            .store
            .statuses()
            .await?
            .into_iter()
            .map(|s| (s.id(), s.code().to_string()))
            .collect();

        Ok(invoices
            .iter()
            .map(|invoice| {
                InvoiceSheetRow::new(
                    invoice,
                    names.get(&invoice.issuer_id()).map(String::as_str),
                    names.get(&invoice.receiver_id()).map(String::as_str),
                    codes.get(&invoice.status_id()).map_or("", String::as_str),
                )
            })
            .collect())
    }

    // ── resolution ──────────────────────────────────────────────────────────

    /// Load an invoice for an item operation, checking `action` against the
    /// issuer's tenant.
    async fn invoice_for_items(
        &self,
        actor: &Actor,
        invoice_id: InvoiceId,
        action: Action,
    ) -> DomainResult<(InvoiceWithItems, Business)> {
        let aggregate = self
            .store
            .load_invoice(invoice_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Invoice not found"))?;
        let issuer = self.load_issuer(aggregate.invoice().issuer_id()).await?;
        check(actor, AccessRequest::new(action, ResourceKind::InvoiceItem, Scope::Tenant(issuer.tenant_id())))?;
        Ok((aggregate, issuer))
    }

    async fn load_issuer(&self, id: BusinessId) -> DomainResult<Business> {
        self.store
            .business(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Issuer business not found"))
    }

    async fn load_receiver(&self, actor: &Actor, id: BusinessId) -> DomainResult<Business> {
        let receiver = self
            .store
            .business(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Receiver business not found"))?;
        check(actor, AccessRequest::read(ResourceKind::Business, receiver.tenant_id()))?;
        Ok(receiver)
    }

    async fn resolve_status(&self, code: &str) -> DomainResult<InvoiceStatusId> {
        let normalized = code.trim().to_lowercase();
        self.store
            .status_by_code(&normalized)
            .await?
            .map(|s| s.id())
            .ok_or_else(|| DomainError::validation("status", format!("Invalid invoice status: {code}")))
    }

    /// Blank means no filter.
    async fn status_filter(&self, code: Option<&str>) -> DomainResult<Option<InvoiceStatusId>> {
        match code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => self.resolve_status(code).await.map(Some),
            None => Ok(None),
        }
    }

    async fn status_code(&self, id: InvoiceStatusId) -> DomainResult<String> {
        Ok(self
            .store
            .status(id)
            .await?
            .map(|s| s.code().to_string())
            .unwrap_or_default())
    }

    async fn resolve_tax(&self, reference: TaxRef) -> DomainResult<Option<Tax>> {
        let tax = match reference {
            TaxRef::Id(id) => self
                .store
                .tax(id)
                .await?
                .ok_or_else(|| DomainError::validation("tax_id", format!("Tax with ID {id} not found")))?,
            TaxRef::Rate(rate) => self.store.tax_by_rate(rate).await?.ok_or_else(|| {
                DomainError::validation("tax_rate", "Tax rate must be null (exempted), 0, 8, or 19")
            })?,
        };
        Ok(Some(tax))
    }

    async fn check_article(&self, issuer_id: BusinessId, article_id: ArticleId) -> DomainResult<()> {
        let article = self
            .store
            .article(article_id)
            .await?
            .ok_or_else(|| DomainError::validation("article_id", format!("Article with ID {article_id} not found")))?;
        if !article.belongs_to(issuer_id) {
            return Err(DomainError::validation(
                "article_id",
                "Article must belong to the invoice issuer business",
            ));
        }
        Ok(())
    }

    async fn resolve_item(&self, issuer_id: BusinessId, input: ItemInput) -> DomainResult<(ItemDraft, Option<Tax>)> {
        if let Some(article_id) = input.article_id {
            self.check_article(issuer_id, article_id).await?;
        }
        let tax = match input.tax {
            Some(reference) => self.resolve_tax(reference).await?,
            None => None,
        };
        let draft = ItemDraft {
            description: input.description,
            quantity: input.quantity,
            unit_price: input.unit_price,
            article_id: input.article_id,
        };
        Ok((draft, tax))
    }

    async fn resolve_items(
        &self,
        issuer_id: BusinessId,
        inputs: Vec<ItemInput>,
    ) -> DomainResult<Vec<(ItemDraft, Option<Tax>)>> {
        let mut lines = Vec::with_capacity(inputs.len());
        for input in inputs {
            lines.push(self.resolve_item(issuer_id, input).await?);
        }
        Ok(lines)
    }

    async fn build_items(
        &self,
        invoice_id: InvoiceId,
        lines: &[(ItemDraft, Option<Tax>)],
        at: chrono::DateTime<chrono::Utc>,
    ) -> DomainResult<Vec<InvoiceItem>> {
        let mut items = Vec::with_capacity(lines.len());
        for (index, (draft, tax)) in lines.iter().enumerate() {
            items.push(InvoiceItem::create(
                self.next_id(Sequence::InvoiceItem).await?,
                invoice_id,
                u32::try_from(index).unwrap_or(u32::MAX),
                draft.clone(),
                tax.as_ref(),
                at,
            )?);
        }
        Ok(items)
    }
}

use std::collections::BTreeSet;

use invoicer_core::{BusinessId, DomainError, DomainResult, Entity, InvoiceId, InvoiceItemId};
use invoicer_invoicing::{Invoice, InvoiceNumber, InvoiceWithItems};

use super::{InMemoryStore, InvoiceFilter, StoreError, StoreResult, Tables, missing};

impl Tables {
    fn check_invoice(&self, aggregate: &InvoiceWithItems) -> StoreResult<()> {
        let invoice = aggregate.invoice();
        for (what, id) in [("issuer", invoice.issuer_id()), ("receiver", invoice.receiver_id())] {
            if !self.businesses.contains_key(&id) {
                return Err(StoreError::ReferentialViolation(format!(
                    "{what} business {id} does not exist"
                )));
            }
        }
        if !self.statuses.contains_key(&invoice.status_id()) {
            return Err(StoreError::ReferentialViolation(format!(
                "invoice status {} does not exist",
                invoice.status_id()
            )));
        }
        for item in aggregate.items() {
            if let Some(tax_id) = item.tax_id().filter(|id| !self.taxes.contains_key(id)) {
                return Err(StoreError::ReferentialViolation(format!("tax {tax_id} does not exist")));
            }
            if let Some(article_id) = item.article_id().filter(|id| !self.articles.contains_key(id)) {
                return Err(StoreError::ReferentialViolation(format!(
                    "article {article_id} does not exist"
                )));
            }
        }

        let duplicate = self.invoices.values().any(|other| {
            other.id() != invoice.id()
                && other.issuer_id() == invoice.issuer_id()
                && other.invoice_number() == invoice.invoice_number()
        });
        if duplicate {
            return Err(StoreError::UniqueViolation(format!(
                "Invoice number {} already exists for issuer {}",
                invoice.invoice_number(),
                invoice.issuer_id()
            )));
        }
        Ok(())
    }

    fn load_aggregate(&self, id: InvoiceId) -> DomainResult<Option<InvoiceWithItems>> {
        let Some(invoice) = self.invoices.get(&id).cloned() else {
            return Ok(None);
        };
        let items = self
            .items
            .values()
            .filter(|i| i.invoice_id() == id)
            .cloned()
            .collect();
        InvoiceWithItems::new(invoice, items).map(Some)
    }

    fn write_items(&mut self, aggregate: &InvoiceWithItems) {
        let invoice_id = aggregate.invoice().id();
        let keep: BTreeSet<InvoiceItemId> = aggregate.items().iter().map(|i| i.id()).collect();
        self.items
            .retain(|id, item| item.invoice_id() != invoice_id || keep.contains(id));
        for item in aggregate.items() {
            self.items.insert(item.id(), item.clone());
        }
    }
}

impl InMemoryStore {
    /// Insert a new invoice with its items. `(issuer, invoice_number)` is
    /// unique; a clash is reported as [`StoreError::UniqueViolation`] so the
    /// caller can retry with another number.
    pub fn insert_invoice(&self, aggregate: &InvoiceWithItems) -> StoreResult<()> {
        let mut tables = self.write()?;
        let invoice = aggregate.invoice();
        if tables.invoices.contains_key(&invoice.id()) {
            return Err(StoreError::UniqueViolation(format!(
                "invoice {} already exists",
                invoice.id()
            )));
        }
        tables.check_invoice(aggregate)?;
        tables.invoices.insert(invoice.id(), invoice.clone());
        tables.write_items(aggregate);
        Ok(())
    }

    /// Load, mutate and write back an invoice under the write lock: header
    /// plus the exact item set (items the mutation dropped are deleted).
    pub fn mutate_invoice<F>(&self, id: InvoiceId, mutate: F) -> DomainResult<InvoiceWithItems>
    where
        F: FnOnce(&mut InvoiceWithItems) -> DomainResult<()>,
    {
        let mut tables = self.write()?;
        let mut aggregate = tables
            .load_aggregate(id)?
            .ok_or_else(|| DomainError::not_found("Invoice not found"))?;
        mutate(&mut aggregate)?;
        tables.check_invoice(&aggregate)?;
        tables.invoices.insert(id, aggregate.invoice().clone());
        tables.write_items(&aggregate);
        Ok(aggregate)
    }

    /// Load an invoice together with its items, ordered by `sort_order`.
    pub fn load_invoice(&self, id: InvoiceId) -> DomainResult<Option<InvoiceWithItems>> {
        self.read()?.load_aggregate(id)
    }

    /// Invoice headers matching `filter`, newest first.
    pub fn invoices(&self, filter: &InvoiceFilter) -> StoreResult<Vec<Invoice>> {
        Ok(self
            .read()?
            .invoices
            .values()
            .rev()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }

    /// Number of the issuer's most recently created invoice.
    pub fn last_invoice_number(&self, issuer_id: BusinessId) -> StoreResult<Option<InvoiceNumber>> {
        Ok(self
            .read()?
            .invoices
            .values()
            .rev()
            .find(|i| i.issuer_id() == issuer_id)
            .map(|i| i.invoice_number().clone()))
    }

    pub fn delete_invoice(&self, id: InvoiceId) -> StoreResult<()> {
        let mut tables = self.write()?;
        if !tables.invoices.contains_key(&id) {
            return Err(missing("invoice", id));
        }
        tables.delete_invoice_cascade(id);
        Ok(())
    }
}

//! Invoice header and the invoice-with-items aggregate.
//!
//! `Invoice` carries the header and the derived totals. Items live in their own
//! rows and reference the invoice by id; `InvoiceWithItems` is the explicit
//! "invoice loaded with its items" unit every item mutation goes through.
//! Each mutation on the aggregate re-aggregates totals and keeps `sort_order`
//! dense (`0..n`) before returning.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use invoicer_core::money::{self, MONEY_SCALE};
use invoicer_core::{
    ArticleId, BusinessId, Decimal, DomainError, DomainResult, Entity, InvoiceId, InvoiceItemId,
    InvoiceStatusId,
};

use crate::line_item::{InvoiceItem, ItemPatch};
use crate::numbering::InvoiceNumber;
use crate::Tax;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InvoiceDraft {
    pub issuer_id: BusinessId,
    pub receiver_id: BusinessId,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status_id: InvoiceStatusId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoicePatch {
    pub issuer_id: Option<BusinessId>,
    pub receiver_id: Option<BusinessId>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub status_id: Option<InvoiceStatusId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    id: InvoiceId,
    issuer_id: BusinessId,
    receiver_id: BusinessId,
    invoice_number: InvoiceNumber,
    invoice_date: NaiveDate,
    due_date: NaiveDate,
    status_id: InvoiceStatusId,
    subtotal: Decimal,
    total: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Invoice {
    /// A new invoice has no items, so both totals start at `0.00`.
    pub fn create(id: InvoiceId, invoice_number: InvoiceNumber, draft: InvoiceDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            issuer_id: draft.issuer_id,
            receiver_id: draft.receiver_id,
            invoice_number,
            invoice_date: draft.invoice_date,
            due_date: draft.due_date,
            status_id: draft.status_id,
            subtotal: money::zero(MONEY_SCALE),
            total: money::zero(MONEY_SCALE),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn issuer_id(&self) -> BusinessId {
        self.issuer_id
    }

    pub fn receiver_id(&self) -> BusinessId {
        self.receiver_id
    }

    pub fn invoice_number(&self) -> &InvoiceNumber {
        &self.invoice_number
    }

    pub fn invoice_date(&self) -> NaiveDate {
        self.invoice_date
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn status_id(&self) -> InvoiceStatusId {
        self.status_id
    }

    pub fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    /// Tax part of the total, as shown in exports.
    pub fn tax_total(&self) -> Decimal {
        money::truncate(self.total - self.subtotal, MONEY_SCALE)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Header fields only. Issuer permission checks happen before this call.
    pub fn apply(&mut self, patch: InvoicePatch, now: DateTime<Utc>) {
        if let Some(issuer_id) = patch.issuer_id {
            self.issuer_id = issuer_id;
        }
        if let Some(receiver_id) = patch.receiver_id {
            self.receiver_id = receiver_id;
        }
        if let Some(date) = patch.invoice_date {
            self.invoice_date = date;
        }
        if let Some(date) = patch.due_date {
            self.due_date = date;
        }
        if let Some(status_id) = patch.status_id {
            self.status_id = status_id;
        }
        self.updated_at = now;
    }
}

/// An invoice header row exactly as stored. Totals are re-aggregated when the
/// header is assembled with its items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRecord {
    pub id: InvoiceId,
    pub issuer_id: BusinessId,
    pub receiver_id: BusinessId,
    pub invoice_number: InvoiceNumber,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status_id: InvoiceStatusId,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn restore(record: InvoiceRecord) -> Self {
        Self {
            id: record.id,
            issuer_id: record.issuer_id,
            receiver_id: record.receiver_id,
            invoice_number: record.invoice_number,
            invoice_date: record.invoice_date,
            due_date: record.due_date,
            status_id: record.status_id,
            subtotal: record.subtotal,
            total: record.total,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// An invoice together with its ordered items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceWithItems {
    #[serde(flatten)]
    invoice: Invoice,
    items: Vec<InvoiceItem>,
}

impl InvoiceWithItems {
    /// Assemble from stored rows. Items are ordered by their stored
    /// `sort_order` (ties by id) and totals are re-aggregated.
    pub fn new(invoice: Invoice, mut items: Vec<InvoiceItem>) -> DomainResult<Self> {
        if let Some(stray) = items.iter().find(|i| i.invoice_id() != invoice.id()) {
            return Err(foreign_item(stray.id()));
        }
        items.sort_by_key(|i| (i.sort_order(), i.id()));
        let mut aggregate = Self { invoice, items };
        aggregate.renumber();
        aggregate.recalculate()?;
        Ok(aggregate)
    }

    pub fn invoice(&self) -> &Invoice {
        &self.invoice
    }

    pub fn items(&self) -> &[InvoiceItem] {
        &self.items
    }

    pub fn item(&self, item_id: InvoiceItemId) -> DomainResult<&InvoiceItem> {
        self.items
            .iter()
            .find(|i| i.id() == item_id)
            .ok_or_else(|| item_not_found(item_id))
    }

    pub fn into_parts(self) -> (Invoice, Vec<InvoiceItem>) {
        (self.invoice, self.items)
    }

    /// Sort order a newly added item receives.
    pub fn next_sort_order(&self) -> u32 {
        u32::try_from(self.items.len()).unwrap_or(u32::MAX)
    }

    pub fn apply(&mut self, patch: InvoicePatch, now: DateTime<Utc>) {
        self.invoice.apply(patch, now);
    }

    /// Append an item at the end.
    pub fn add_item(&mut self, mut item: InvoiceItem, now: DateTime<Utc>) -> DomainResult<&InvoiceItem> {
        if item.invoice_id() != self.invoice.id() {
            return Err(foreign_item(item.id()));
        }
        item.set_sort_order(self.next_sort_order());
        self.items.push(item);
        self.touch(now)?;
        let last = self.items.len() - 1;
        Ok(&self.items[last])
    }

    /// Patch one item and re-aggregate. `tax` is the tax the item carries
    /// after the update.
    pub fn update_item(
        &mut self,
        item_id: InvoiceItemId,
        patch: ItemPatch,
        tax: Option<&Tax>,
        now: DateTime<Utc>,
    ) -> DomainResult<&InvoiceItem> {
        let index = self.position(item_id)?;
        self.items[index].update(patch, tax, now)?;
        self.touch(now)?;
        Ok(&self.items[index])
    }

    /// Remove one item; the remaining items are renumbered densely.
    pub fn remove_item(&mut self, item_id: InvoiceItemId, now: DateTime<Utc>) -> DomainResult<InvoiceItem> {
        let index = self.position(item_id)?;
        let removed = self.items.remove(index);
        self.renumber();
        self.touch(now)?;
        Ok(removed)
    }

    /// Bulk replacement: the new items take positions in the given order.
    pub fn replace_items(&mut self, items: Vec<InvoiceItem>, now: DateTime<Utc>) -> DomainResult<Vec<InvoiceItem>> {
        if let Some(stray) = items.iter().find(|i| i.invoice_id() != self.invoice.id()) {
            return Err(foreign_item(stray.id()));
        }
        let previous = std::mem::replace(&mut self.items, items);
        self.renumber();
        self.touch(now)?;
        Ok(previous)
    }

    /// Reorder to `order`, which must name every item exactly once.
    pub fn reorder(&mut self, order: &[InvoiceItemId], now: DateTime<Utc>) -> DomainResult<()> {
        let current: BTreeSet<InvoiceItemId> = self.items.iter().map(|i| i.id()).collect();
        let requested: BTreeSet<InvoiceItemId> = order.iter().copied().collect();
        if requested.len() != order.len() || requested != current {
            return Err(DomainError::validation(
                "item_ids",
                "All invoice items must be included in the reorder",
            ));
        }

        self.items
            .sort_by_key(|item| order.iter().position(|id| *id == item.id()).unwrap_or(usize::MAX));
        self.renumber();
        self.touch(now)
    }

    /// The article was deleted; items keep their amounts but lose the link.
    pub fn detach_article(&mut self, article_id: ArticleId, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        for item in self.items.iter_mut().filter(|i| i.article_id() == Some(article_id)) {
            item.detach_article(now);
            changed = true;
        }
        changed
    }

    /// Re-derive `subtotal` and `total` from the items. Idempotent.
    pub fn recalculate(&mut self) -> DomainResult<()> {
        self.invoice.subtotal = money::sum(self.items.iter().map(InvoiceItem::subtotal), MONEY_SCALE)?;
        self.invoice.total = money::sum(self.items.iter().map(InvoiceItem::total), MONEY_SCALE)?;
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.recalculate()?;
        self.invoice.updated_at = now;
        Ok(())
    }

    fn renumber(&mut self) {
        for (index, item) in self.items.iter_mut().enumerate() {
            item.set_sort_order(u32::try_from(index).unwrap_or(u32::MAX));
        }
    }

    fn position(&self, item_id: InvoiceItemId) -> DomainResult<usize> {
        self.items
            .iter()
            .position(|i| i.id() == item_id)
            .ok_or_else(|| item_not_found(item_id))
    }
}

fn item_not_found(item_id: InvoiceItemId) -> DomainError {
    DomainError::not_found(format!("Invoice item with ID {item_id} not found"))
}

fn foreign_item(item_id: InvoiceItemId) -> DomainError {
    DomainError::validation(
        "invoice_id",
        format!("Invoice item {item_id} belongs to a different invoice"),
    )
}

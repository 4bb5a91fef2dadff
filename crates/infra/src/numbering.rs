//! Per-issuer invoice number allocation.
//!
//! Allocation for one issuer is serialized by an async mutex; the store's
//! `(issuer, invoice_number)` unique key backs it up. A clash (a number taken
//! outside this allocator, or by a legacy row) is retried with the next
//! sequence, up to a bounded number of attempts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use invoicer_core::{BusinessId, DomainError, DomainResult, Entity};
use invoicer_invoicing::{InvoiceNumber, InvoiceWithItems};

use crate::store::{BackOfficeStore, InvoiceStore, StoreError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug)]
pub struct InvoiceNumberAllocator {
    locks: Mutex<HashMap<BusinessId, Arc<tokio::sync::Mutex<()>>>>,
    max_attempts: u32,
}

impl Default for InvoiceNumberAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl InvoiceNumberAllocator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            max_attempts: max_attempts.max(1),
        }
    }

    fn lock_for(&self, issuer: BusinessId) -> DomainResult<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| DomainError::external("number allocator lock poisoned"))?;
        Ok(locks.entry(issuer).or_default().clone())
    }

    /// Allocate the next number for `issuer`, build the invoice with it and
    /// insert it.
    ///
    /// `build` is called once per attempt with the candidate number. Attempt
    /// `k` (zero-based) uses `next_sequence + k`.
    pub async fn create_invoice<F>(
        &self,
        store: &dyn BackOfficeStore,
        issuer: BusinessId,
        mut build: F,
    ) -> DomainResult<InvoiceWithItems>
    where
        F: FnMut(InvoiceNumber) -> DomainResult<InvoiceWithItems> + Send,
    {
        let lock = self.lock_for(issuer)?;
        let _guard = lock.lock().await;

        let last = store.last_invoice_number(issuer).await?;
        let base = InvoiceNumber::next_sequence(last.as_ref(), issuer);

        for attempt in 0..self.max_attempts {
            let number = InvoiceNumber::format(issuer, base + u64::from(attempt));
            let aggregate = build(number.clone())?;
            match store.insert_invoice(&aggregate).await {
                Ok(()) => {
                    tracing::info!(
                        issuer_id = %issuer,
                        invoice_id = %aggregate.invoice().id(),
                        invoice_number = %number,
                        "invoice created"
                    );
                    return Ok(aggregate);
                }
                Err(StoreError::UniqueViolation(reason)) => {
                    tracing::warn!(
                        issuer_id = %issuer,
                        invoice_number = %number,
                        attempt = attempt + 1,
                        %reason,
                        "invoice number collision, retrying"
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(DomainError::conflict(format!(
            "Could not allocate a unique invoice number for issuer {issuer} after {} attempts",
            self.max_attempts
        )))
    }
}

use async_trait::async_trait;
use serde::Serialize;

use invoicer_core::money::{self, MONEY_SCALE};
use invoicer_core::{Decimal, DomainError, DomainResult};
use invoicer_invoicing::{InvoiceWithItems, TaxBreakdownLine, status_label, tax_breakdown};
use invoicer_parties::{BankAccount, Business};

use super::{RenderedFile, sanitize_file_name};

/// Everything a printed invoice shows, fully computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceDocument {
    pub invoice: InvoiceWithItems,
    pub issuer: Business,
    pub receiver: Business,
    /// Accounts of the issuer, printed as payment instructions.
    pub bank_accounts: Vec<BankAccount>,
    pub status: String,
    pub tax_breakdown: Vec<TaxBreakdownLine>,
    pub tax_total: Decimal,
}

impl InvoiceDocument {
    pub fn new(
        invoice: InvoiceWithItems,
        issuer: Business,
        receiver: Business,
        bank_accounts: Vec<BankAccount>,
        status_code: &str,
    ) -> DomainResult<Self> {
        let tax_breakdown = tax_breakdown(invoice.items())?;
        let tax_total = money::sum(tax_breakdown.iter().map(|l| l.total), MONEY_SCALE)?;
        Ok(Self {
            invoice,
            issuer,
            receiver,
            bank_accounts,
            status: status_label(status_code).to_string(),
            tax_breakdown,
            tax_total,
        })
    }

    pub fn file_name(&self) -> String {
        sanitize_file_name(&format!(
            "invoice-{}.pdf",
            self.invoice.invoice().invoice_number()
        ))
    }
}

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, document: &InvoiceDocument) -> DomainResult<RenderedFile>;
}

/// Serializes the document model as JSON; a stand-in for a real typesetter.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDocumentRenderer;

#[async_trait]
impl PdfRenderer for JsonDocumentRenderer {
    async fn render(&self, document: &InvoiceDocument) -> DomainResult<RenderedFile> {
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| DomainError::external(format!("could not render invoice: {e}")))?;
        Ok(RenderedFile {
            file_name: document.file_name(),
            content_type: "application/json".to_string(),
            bytes,
        })
    }
}

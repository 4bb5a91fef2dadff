//! Invoicing domain module.
//!
//! Line-item arithmetic, invoice aggregation, sequential numbering and the
//! tax/status lookups they depend on, implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage).

pub mod document;
pub mod invoice;
pub mod line_item;
pub mod numbering;
pub mod status;
pub mod tax;

pub use document::{EXEMPT_LABEL, InvoiceSheetRow, SHEET_HEADERS, TaxBreakdownLine, status_label, tax_breakdown};
pub use invoice::{Invoice, InvoiceDraft, InvoicePatch, InvoiceRecord, InvoiceWithItems};
pub use line_item::{InvoiceItem, InvoiceItemRecord, ItemDraft, ItemPatch, LineAmounts, calculate_line};
pub use numbering::InvoiceNumber;
pub use status::{InvoiceStatus, InvoiceStatusDraft, InvoiceStatusRecord};
pub use tax::{Tax, TaxDraft, TaxPatch, TaxRecord};

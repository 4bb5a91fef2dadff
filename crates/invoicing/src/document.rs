//! Read-only projections handed to the PDF renderer and the spreadsheet
//! exporter. Everything here is computed from already-aggregated invoices.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use invoicer_core::money::{self, MONEY_SCALE};
use invoicer_core::{Decimal, DomainResult};

use crate::{Invoice, InvoiceItem};

pub const EXEMPT_LABEL: &str = "E përjashtuar";

/// Tax collected at one rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxBreakdownLine {
    pub label: String,
    /// `None` for exempted and untaxed items.
    pub rate: Option<Decimal>,
    pub total: Decimal,
}

/// Group item tax amounts by rate, ascending, with the exempt group last.
pub fn tax_breakdown(items: &[InvoiceItem]) -> DomainResult<Vec<TaxBreakdownLine>> {
    let mut by_rate: BTreeMap<Decimal, Decimal> = BTreeMap::new();
    let mut exempt: Option<Decimal> = None;

    for item in items {
        let bucket = match item.tax_rate() {
            Some(rate) => by_rate.entry(rate.normalize()).or_insert_with(|| money::zero(MONEY_SCALE)),
            None => exempt.get_or_insert_with(|| money::zero(MONEY_SCALE)),
        };
        *bucket = money::add(*bucket, item.tax_amount(), MONEY_SCALE)?;
    }

    let mut lines: Vec<TaxBreakdownLine> = by_rate
        .into_iter()
        .map(|(rate, total)| TaxBreakdownLine {
            label: format!("TVSH {rate}%"),
            rate: Some(rate),
            total,
        })
        .collect();
    if let Some(total) = exempt {
        lines.push(TaxBreakdownLine {
            label: EXEMPT_LABEL.to_string(),
            rate: None,
            total,
        });
    }
    Ok(lines)
}

/// Localized label for a status code; unknown codes are shown as-is.
pub fn status_label(code: &str) -> &str {
    match code {
        "draft" => "Draft",
        "sent" => "Dërguar",
        "paid" => "Paguar",
        "overdue" => "Vonuar",
        "cancelled" => "Anuluar",
        other => other,
    }
}

/// Spreadsheet column headers, in row order.
pub const SHEET_HEADERS: [&str; 9] = [
    "Nr. Faturës",
    "Data e Faturës",
    "Data e Skadimit",
    "Lëshuesi",
    "Marrësi",
    "Statusi",
    "Pa TVSH",
    "TVSH",
    "Me TVSH / Totali",
];

/// One spreadsheet row per invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceSheetRow {
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub issuer_name: String,
    pub receiver_name: String,
    pub status: String,
    pub subtotal: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
}

impl InvoiceSheetRow {
    /// Missing parties are shown as `N/A`.
    pub fn new(invoice: &Invoice, issuer_name: Option<&str>, receiver_name: Option<&str>, status_code: &str) -> Self {
        Self {
            invoice_number: invoice.invoice_number().to_string(),
            invoice_date: invoice.invoice_date(),
            due_date: invoice.due_date(),
            issuer_name: issuer_name.unwrap_or("N/A").to_string(),
            receiver_name: receiver_name.unwrap_or("N/A").to_string(),
            status: status_label(status_code).to_string(),
            subtotal: invoice.subtotal(),
            vat: invoice.tax_total(),
            total: invoice.total(),
        }
    }
}

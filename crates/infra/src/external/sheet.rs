use async_trait::async_trait;
use chrono::{DateTime, Utc};

use invoicer_core::DomainResult;
use invoicer_invoicing::{InvoiceSheetRow, SHEET_HEADERS};

use super::{RenderedFile, sanitize_file_name};

#[async_trait]
pub trait SheetExporter: Send + Sync {
    async fn export(&self, rows: &[InvoiceSheetRow], generated_at: DateTime<Utc>) -> DomainResult<RenderedFile>;
}

/// Tab-separated export with the same columns as the spreadsheet.
#[derive(Debug, Default, Clone, Copy)]
pub struct TsvSheetExporter;

fn cell(raw: &str) -> String {
    raw.replace(['\t', '\n', '\r'], " ")
}

#[async_trait]
impl SheetExporter for TsvSheetExporter {
    async fn export(&self, rows: &[InvoiceSheetRow], generated_at: DateTime<Utc>) -> DomainResult<RenderedFile> {
        let mut out = SHEET_HEADERS.join("\t");
        out.push('\n');
        for row in rows {
            let cells = [
                cell(&row.invoice_number),
                row.invoice_date.format("%d.%m.%Y").to_string(),
                row.due_date.format("%d.%m.%Y").to_string(),
                cell(&row.issuer_name),
                cell(&row.receiver_name),
                cell(&row.status),
                row.subtotal.to_string(),
                row.vat.to_string(),
                row.total.to_string(),
            ];
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }

        tracing::debug!(rows = rows.len(), "invoice sheet exported");
        Ok(RenderedFile {
            file_name: sanitize_file_name(&format!("faturat-{}.tsv", generated_at.format("%Y-%m-%d-%H%M%S"))),
            content_type: "text/tab-separated-values; charset=utf-8".to_string(),
            bytes: out.into_bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    use super::*;

    fn row() -> InvoiceSheetRow {
        let date = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
        InvoiceSheetRow {
            invoice_number: "INV-1-1".to_string(),
            invoice_date: date,
            due_date: date,
            issuer_name: "Issuer\tLLC".to_string(),
            receiver_name: "N/A".to_string(),
            status: "Paguar".to_string(),
            subtotal: dec!(110.00),
            vat: dec!(19.00),
            total: dec!(129.00),
        }
    }

    #[tokio::test]
    async fn header_then_one_line_per_invoice() {
        let at = Utc.with_ymd_and_hms(2025, 2, 3, 10, 20, 30).unwrap();
        let file = TsvSheetExporter.export(&[row()], at).await.unwrap();
        assert_eq!(file.file_name, "faturat-2025-02-03-102030.tsv");

        let text = String::from_utf8(file.bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Nr. Faturës\t"));
        assert_eq!(
            lines[1],
            "INV-1-1\t03.02.2025\t03.02.2025\tIssuer LLC\tN/A\tPaguar\t110.00\t19.00\t129.00"
        );
    }
}

//! Outbound collaborators: email, document rendering and logo storage.
//!
//! The back office only hands these fully computed, validated data. Each
//! trait has an in-memory adapter used by the bootstrap binary and the tests.

pub mod email;
pub mod logo;
pub mod pdf;
pub mod sheet;

use serde::Serialize;

pub use email::{EmailMessage, EmailSender, LogEmailSender, RecordingEmailSender};
pub use logo::{FsLogoStore, InMemoryLogoStore, LogoStore};
pub use pdf::{InvoiceDocument, JsonDocumentRenderer, PdfRenderer};
pub use sheet::{SheetExporter, TsvSheetExporter};

/// A rendered file ready to be streamed back as an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedFile {
    pub file_name: String,
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Replace anything outside `[A-Za-z0-9._-]` so the name is safe in a
/// `Content-Disposition` header and on disk.
pub fn sanitize_file_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

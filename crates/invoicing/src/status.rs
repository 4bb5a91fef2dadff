use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invoicer_core::{DomainError, DomainResult, Entity, InvoiceStatusId};

/// Codes seeded into every fresh store, in display order.
pub const DEFAULT_CODES: [&str; 5] = ["draft", "sent", "paid", "overdue", "cancelled"];

/// Status assigned to new invoices when the caller does not pick one.
pub const DEFAULT_CODE: &str = "draft";

/// Lookup row for invoice lifecycle codes. Invoices reference it by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceStatus {
    id: InvoiceStatusId,
    code: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InvoiceStatusDraft {
    pub code: String,
}

impl InvoiceStatus {
    pub fn create(id: InvoiceStatusId, draft: InvoiceStatusDraft, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id,
            code: normalize_code(&draft.code, "Status code is required")?,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn rename(&mut self, code: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.code = normalize_code(code, "Status code cannot be empty")?;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceStatusRecord {
    pub id: InvoiceStatusId,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceStatus {
    pub fn restore(record: InvoiceStatusRecord) -> Self {
        Self {
            id: record.id,
            code: record.code,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Entity for InvoiceStatus {
    type Id = InvoiceStatusId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

pub fn normalize_code(code: &str, blank_message: &str) -> DomainResult<String> {
    let code = code.trim().to_lowercase();
    if code.is_empty() {
        return Err(DomainError::validation("code", blank_message));
    }
    if code.chars().count() > 50 {
        return Err(DomainError::validation("code", "Status code must be at most 50 characters"));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_trimmed_and_lowercased() {
        let status = InvoiceStatus::create(
            InvoiceStatusId::new(1),
            InvoiceStatusDraft {
                code: " Disputed ".to_string(),
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(status.code(), "disputed");
    }

    #[test]
    fn blank_rename_is_rejected() {
        let mut status = InvoiceStatus::create(
            InvoiceStatusId::new(1),
            InvoiceStatusDraft {
                code: DEFAULT_CODE.to_string(),
            },
            Utc::now(),
        )
        .unwrap();
        let err = status.rename("  ", Utc::now()).unwrap_err();
        match err {
            DomainError::Validation { message, .. } => assert_eq!(message, "Status code cannot be empty"),
            _ => panic!("Expected Validation error"),
        }
        assert_eq!(status.code(), "draft");
    }
}

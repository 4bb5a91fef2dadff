use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invoicer_core::{BankAccountId, BusinessId, DomainResult, Entity};

use crate::text;

const SWIFT_MAX: usize = 11;
const IBAN_MAX: usize = 34;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BankAccountDraft {
    pub bank_account_number: String,
    pub swift: Option<String>,
    pub iban: Option<String>,
    pub bank_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BankAccountPatch {
    pub bank_account_number: Option<String>,
    pub swift: Option<String>,
    pub iban: Option<String>,
    pub bank_name: Option<String>,
}

/// Bank account printed on invoices issued by its business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankAccount {
    id: BankAccountId,
    business_id: BusinessId,
    bank_account_number: String,
    swift: Option<String>,
    iban: Option<String>,
    bank_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BankAccount {
    pub fn create(
        id: BankAccountId,
        business_id: BusinessId,
        draft: BankAccountDraft,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let mut account = Self {
            id,
            business_id,
            bank_account_number: String::new(),
            swift: None,
            iban: None,
            bank_name: None,
            created_at: now,
            updated_at: now,
        };
        account.set(draft)?;
        Ok(account)
    }

    pub fn business_id(&self) -> BusinessId {
        self.business_id
    }

    pub fn bank_account_number(&self) -> &str {
        &self.bank_account_number
    }

    pub fn swift(&self) -> Option<&str> {
        self.swift.as_deref()
    }

    pub fn iban(&self) -> Option<&str> {
        self.iban.as_deref()
    }

    pub fn bank_name(&self) -> Option<&str> {
        self.bank_name.as_deref()
    }

    pub fn apply(&mut self, patch: BankAccountPatch, now: DateTime<Utc>) -> DomainResult<()> {
        let draft = BankAccountDraft {
            bank_account_number: patch
                .bank_account_number
                .unwrap_or_else(|| self.bank_account_number.clone()),
            swift: patch.swift.or_else(|| self.swift.clone()),
            iban: patch.iban.or_else(|| self.iban.clone()),
            bank_name: patch.bank_name.or_else(|| self.bank_name.clone()),
        };
        self.set(draft)?;
        self.updated_at = now;
        Ok(())
    }

    fn set(&mut self, draft: BankAccountDraft) -> DomainResult<()> {
        let number = text::required(
            "bank_account_number",
            &draft.bank_account_number,
            "Bank account number is required",
        )?;
        let swift = text::optional("swift", draft.swift, SWIFT_MAX)?;
        let iban = text::optional("iban", draft.iban, IBAN_MAX)?;
        let bank_name = text::optional("bank_name", draft.bank_name, 255)?;

        self.bank_account_number = number;
        self.swift = swift;
        self.iban = iban;
        self.bank_name = bank_name;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankAccountRecord {
    pub id: BankAccountId,
    pub business_id: BusinessId,
    pub bank_account_number: String,
    pub swift: Option<String>,
    pub iban: Option<String>,
    pub bank_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BankAccount {
    pub fn restore(record: BankAccountRecord) -> Self {
        Self {
            id: record.id,
            business_id: record.business_id,
            bank_account_number: record.bank_account_number,
            swift: record.swift,
            iban: record.iban,
            bank_name: record.bank_name,
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

impl Entity for BankAccount {
    type Id = BankAccountId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoicer_core::DomainError;

    fn draft() -> BankAccountDraft {
        BankAccountDraft {
            bank_account_number: "1110-0000-0000-01".to_string(),
            swift: Some("RBKOXKPR".to_string()),
            iban: Some("XK051212012345678906".to_string()),
            bank_name: Some("Raiffeisen".to_string()),
        }
    }

    #[test]
    fn account_number_is_required() {
        let err = BankAccount::create(
            BankAccountId::new(1),
            BusinessId::new(1),
            BankAccountDraft {
                bank_account_number: "  ".to_string(),
                ..draft()
            },
            Utc::now(),
        )
        .unwrap_err();
        match err {
            DomainError::Validation { message, .. } => {
                assert_eq!(message, "Bank account number is required")
            }
            _ => panic!("Expected Validation error"),
        }
    }

    #[test]
    fn swift_and_iban_lengths_are_bounded() {
        let too_long_swift = BankAccountDraft {
            swift: Some("ABCDEFGHIJKL".to_string()),
            ..draft()
        };
        assert!(BankAccount::create(BankAccountId::new(1), BusinessId::new(1), too_long_swift, Utc::now()).is_err());

        let too_long_iban = BankAccountDraft {
            iban: Some("X".repeat(35)),
            ..draft()
        };
        assert!(BankAccount::create(BankAccountId::new(1), BusinessId::new(1), too_long_iban, Utc::now()).is_err());
    }

    #[test]
    fn patch_keeps_unspecified_fields() {
        let mut account =
            BankAccount::create(BankAccountId::new(1), BusinessId::new(1), draft(), Utc::now()).unwrap();
        account
            .apply(
                BankAccountPatch {
                    bank_name: Some("ProCredit".to_string()),
                    ..BankAccountPatch::default()
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(account.bank_name(), Some("ProCredit"));
        assert_eq!(account.swift(), Some("RBKOXKPR"));
    }
}

//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers are assigned by the store from a monotonically increasing
//! sequence, so ordering by id is ordering by creation.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a tenant (multi-tenant boundary).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(i64);

/// Identifier of a user (actor identity).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessId(i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BankAccountId(i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(i64);

/// Identifier of a global tax rate row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxId(i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceItemId(i64);

/// Identifier of an invoice status lookup row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceStatusId(i64);

macro_rules! impl_id_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| DomainError::validation($name, format!("invalid identifier: {e}")))?;
                Ok(Self(value))
            }
        }
    };
}

impl_id_newtype!(TenantId, "tenant_id");
impl_id_newtype!(UserId, "user_id");
impl_id_newtype!(BusinessId, "business_id");
impl_id_newtype!(BankAccountId, "bank_account_id");
impl_id_newtype!(ArticleId, "article_id");
impl_id_newtype!(TaxId, "tax_id");
impl_id_newtype!(InvoiceId, "invoice_id");
impl_id_newtype!(InvoiceItemId, "item_id");
impl_id_newtype!(InvoiceStatusId, "status_id");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_and_display_as_plain_integers() {
        let id: BusinessId = " 42 ".parse().unwrap();
        assert_eq!(id, BusinessId::new(42));
        assert_eq!(id.to_string(), "42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
    }

    #[test]
    fn malformed_id_is_a_validation_error_naming_the_field() {
        let err = "abc".parse::<InvoiceId>().unwrap_err();
        match err {
            DomainError::Validation { field, .. } => assert_eq!(field, "invoice_id"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}

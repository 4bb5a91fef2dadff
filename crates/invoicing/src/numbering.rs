//! Human-readable invoice numbers: `INV-{issuerId}-{sequence}`.
//!
//! The sequence is derived from the issuer's most recently created invoice,
//! not from a scan of every historical number. A number in any other format
//! restarts the sequence at 1. Serializing allocations per issuer is the
//! store's job; this module only formats and parses.

use core::fmt;

use serde::{Deserialize, Serialize};

use invoicer_core::{BusinessId, DomainError, DomainResult};

const PREFIX: &str = "INV-";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    pub fn format(issuer: BusinessId, sequence: u64) -> Self {
        Self(format!("{PREFIX}{issuer}-{sequence}"))
    }

    /// Wrap an existing number, which may predate the current format.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DomainError::validation(
                "invoice_number",
                "Invoice number is required",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The sequence part, if this number is in `issuer`'s namespace.
    pub fn sequence_for(&self, issuer: BusinessId) -> Option<u64> {
        let rest = self.0.strip_prefix(PREFIX)?;
        let (id, sequence) = rest.split_once('-')?;
        if id != issuer.to_string() {
            return None;
        }
        if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        sequence.parse().ok()
    }

    /// Sequence to use after `last`, the issuer's most recently created number.
    pub fn next_sequence(last: Option<&InvoiceNumber>, issuer: BusinessId) -> u64 {
        last.and_then(|n| n.sequence_for(issuer))
            .map_or(1, |seq| seq.saturating_add(1))
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InvoiceNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ISSUER: BusinessId = BusinessId::new(7);

    #[test]
    fn formats_issuer_and_sequence() {
        assert_eq!(InvoiceNumber::format(ISSUER, 1).as_str(), "INV-7-1");
        assert_eq!(InvoiceNumber::format(ISSUER, 42).to_string(), "INV-7-42");
    }

    #[test]
    fn first_invoice_starts_at_one() {
        assert_eq!(InvoiceNumber::next_sequence(None, ISSUER), 1);
    }

    #[test]
    fn continues_from_the_last_number() {
        let last = InvoiceNumber::format(ISSUER, 9);
        assert_eq!(InvoiceNumber::next_sequence(Some(&last), ISSUER), 10);
    }

    #[test]
    fn foreign_formats_restart_the_sequence() {
        for raw in [
            "2024/001", "INV-8-3", "INV-7-", "INV-7-12a", "INV-7", "inv-7-3", "INV-07-3", "INV-+7-3",
        ] {
            let last = InvoiceNumber::parse(raw).unwrap();
            assert_eq!(InvoiceNumber::next_sequence(Some(&last), ISSUER), 1, "{raw}");
        }
    }

    #[test]
    fn blank_numbers_are_rejected() {
        assert!(matches!(
            InvoiceNumber::parse("  "),
            Err(DomainError::Validation { .. })
        ));
    }

    proptest! {
        #[test]
        fn sequential_allocation_has_no_gaps(issuer in 1i64..10_000, start in 0u64..1_000, steps in 1usize..50) {
            let issuer = BusinessId::new(issuer);
            let mut last = (start > 0).then(|| InvoiceNumber::format(issuer, start));
            let mut expected = start + 1;
            for _ in 0..steps {
                let next = InvoiceNumber::next_sequence(last.as_ref(), issuer);
                prop_assert_eq!(next, expected);
                last = Some(InvoiceNumber::format(issuer, next));
                expected += 1;
            }
        }

        #[test]
        fn other_issuers_never_continue_the_sequence(a in 1i64..1_000, b in 1i64..1_000, seq in 1u64..1_000) {
            prop_assume!(a != b);
            let last = InvoiceNumber::format(BusinessId::new(a), seq);
            prop_assert_eq!(InvoiceNumber::next_sequence(Some(&last), BusinessId::new(b)), 1);
        }
    }
}

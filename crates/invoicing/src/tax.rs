use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invoicer_core::money::{self, MONEY_SCALE};
use invoicer_core::{Decimal, DomainError, DomainResult, Entity, TaxId};

/// Percentages a tax row may carry. `None` (exempted) is allowed besides these.
pub const ALLOWED_RATES: [i64; 3] = [0, 8, 19];

pub const EXEMPTED_NAME: &str = "Exempted";

/// A global tax rate. Not tenant-scoped; one row per rate.
///
/// An exempted tax (`rate == None`) and a 0% tax both produce zero tax but are
/// distinct rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tax {
    id: TaxId,
    rate: Option<Decimal>,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaxDraft {
    pub rate: Option<Decimal>,
    pub name: Option<String>,
}

/// `rate: Some(None)` switches the row to exempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxPatch {
    pub rate: Option<Option<Decimal>>,
    pub name: Option<String>,
}

impl Tax {
    pub fn create(id: TaxId, draft: TaxDraft, now: DateTime<Utc>) -> DomainResult<Self> {
        let rate = validate_rate(draft.rate)?;
        let name = name_or_default(draft.name, rate);
        Ok(Self {
            id,
            rate,
            name,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn rate(&self) -> Option<Decimal> {
        self.rate
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_exempt(&self) -> bool {
        self.rate.is_none()
    }

    /// Whether this row carries `rate` (numeric comparison, `None` = exempted).
    pub fn has_rate(&self, rate: Option<Decimal>) -> bool {
        match (self.rate, rate) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn apply(&mut self, patch: TaxPatch, now: DateTime<Utc>) -> DomainResult<()> {
        let rate = match patch.rate {
            Some(rate) => validate_rate(rate)?,
            None => self.rate,
        };
        if let Some(name) = patch.name {
            self.name = name_or_default(Some(name), rate);
        }
        self.rate = rate;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxRecord {
    pub id: TaxId,
    pub rate: Option<Decimal>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tax {
    pub fn restore(record: TaxRecord) -> Self {
        Self {
            id: record.id,
            rate: record.rate,
            name: record.name,
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

impl Entity for Tax {
    type Id = TaxId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Check a rate against the allowed set and carry it at money scale.
pub fn validate_rate(rate: Option<Decimal>) -> DomainResult<Option<Decimal>> {
    let Some(rate) = rate else {
        return Ok(None);
    };
    if ALLOWED_RATES.iter().any(|r| Decimal::from(*r) == rate) {
        Ok(Some(money::truncate(rate, MONEY_SCALE)))
    } else {
        Err(DomainError::validation(
            "rate",
            "Tax rate must be null (exempted), 0, 8, or 19",
        ))
    }
}

/// Display name for a rate: `Exempted` or `19%`.
pub fn default_name(rate: Option<Decimal>) -> String {
    match rate {
        None => EXEMPTED_NAME.to_string(),
        Some(rate) => format!("{}%", rate.normalize()),
    }
}

fn name_or_default(name: Option<String>, rate: Option<Decimal>) -> String {
    name.map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| default_name(rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_names_follow_the_rate() {
        let exempt = Tax::create(TaxId::new(1), TaxDraft::default(), Utc::now()).unwrap();
        assert_eq!(exempt.name(), "Exempted");
        assert!(exempt.is_exempt());

        let vat = Tax::create(
            TaxId::new(2),
            TaxDraft {
                rate: Some(dec!(19)),
                name: None,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(vat.name(), "19%");
        assert_eq!(vat.rate().map(|r| r.to_string()).as_deref(), Some("19.00"));
    }

    #[test]
    fn only_fixed_rates_are_allowed() {
        for ok in [dec!(0), dec!(8), dec!(19.00)] {
            assert!(validate_rate(Some(ok)).is_ok());
        }
        for bad in [dec!(5), dec!(8.5), dec!(-8), dec!(100)] {
            match validate_rate(Some(bad)) {
                Err(DomainError::Validation { field, .. }) => assert_eq!(field, "rate"),
                other => panic!("expected validation error for {bad}, got {other:?}"),
            }
        }
    }

    #[test]
    fn zero_percent_is_not_exempted() {
        let zero = Tax::create(
            TaxId::new(3),
            TaxDraft {
                rate: Some(dec!(0)),
                name: None,
            },
            Utc::now(),
        )
        .unwrap();
        assert!(!zero.is_exempt());
        assert_eq!(zero.name(), "0%");
        assert!(zero.has_rate(Some(dec!(0.00))));
        assert!(!zero.has_rate(None));
    }

    #[test]
    fn patch_can_switch_to_exempted() {
        let mut tax = Tax::create(
            TaxId::new(4),
            TaxDraft {
                rate: Some(dec!(8)),
                name: Some("Reduced".to_string()),
            },
            Utc::now(),
        )
        .unwrap();
        tax.apply(
            TaxPatch {
                rate: Some(None),
                name: None,
            },
            Utc::now(),
        )
        .unwrap();
        assert!(tax.is_exempt());
        assert_eq!(tax.name(), "Reduced");
    }
}

//! Invoice line items and the line calculator.
//!
//! ```text
//! subtotal   = trunc2(quantity * unit_price)
//! tax_amount = trunc2(subtotal * trunc4(rate / 100))   (0.00 when exempt or untaxed)
//! total      = trunc2(subtotal + tax_amount)
//! ```
//!
//! The derived fields are private and every mutation goes through a method
//! that recalculates them, so a stale line cannot be observed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invoicer_core::money::{self, MONEY_SCALE, RATE_SCALE};
use invoicer_core::{
    ArticleId, Decimal, DomainError, DomainResult, Entity, InvoiceId, InvoiceItemId, TaxId,
};

use crate::Tax;

/// Derived amounts of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineAmounts {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// Compute a line's amounts. `rate` is a percentage; `None` means no tax or
/// an exempted tax.
pub fn calculate_line(
    quantity: Decimal,
    unit_price: Decimal,
    rate: Option<Decimal>,
) -> DomainResult<LineAmounts> {
    validate_quantity(quantity)?;
    validate_unit_price(unit_price)?;

    let subtotal = money::mul(quantity, unit_price, MONEY_SCALE)?;
    let tax_amount = match rate {
        Some(rate) => {
            let factor = money::div(rate, Decimal::ONE_HUNDRED, RATE_SCALE)?;
            money::mul(subtotal, factor, MONEY_SCALE)?
        }
        None => money::zero(MONEY_SCALE),
    };
    let total = money::add(subtotal, tax_amount, MONEY_SCALE)?;

    Ok(LineAmounts {
        subtotal,
        tax_amount,
        total,
    })
}

fn validate_quantity(quantity: Decimal) -> DomainResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::validation(
            "quantity",
            "Quantity must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_unit_price(unit_price: Decimal) -> DomainResult<()> {
    if unit_price < Decimal::ZERO {
        return Err(DomainError::validation(
            "unit_price",
            "Unit price must be greater than or equal to 0",
        ));
    }
    Ok(())
}

fn validate_description(description: &str) -> DomainResult<String> {
    let description = description.trim();
    if description.is_empty() {
        return Err(DomainError::validation(
            "description",
            "Item description is required",
        ));
    }
    if description.chars().count() > 255 {
        return Err(DomainError::validation(
            "description",
            "Item description must be at most 255 characters",
        ));
    }
    Ok(description.to_string())
}

/// Input for a new line. The tax is resolved by the caller and passed
/// alongside.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ItemDraft {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub article_id: Option<ArticleId>,
}

/// Partial update of a line. `article_id: Some(None)` detaches the article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub article_id: Option<Option<ArticleId>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceItem {
    id: InvoiceItemId,
    invoice_id: InvoiceId,
    article_id: Option<ArticleId>,
    tax_id: Option<TaxId>,
    /// Rate applied at the last recalculation; `None` when exempt or untaxed.
    tax_rate: Option<Decimal>,
    description: String,
    quantity: Decimal,
    unit_price: Decimal,
    subtotal: Decimal,
    tax_amount: Decimal,
    total: Decimal,
    sort_order: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InvoiceItem {
    pub fn create(
        id: InvoiceItemId,
        invoice_id: InvoiceId,
        sort_order: u32,
        draft: ItemDraft,
        tax: Option<&Tax>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let description = validate_description(&draft.description)?;
        let tax_rate = tax.and_then(Tax::rate);
        let amounts = calculate_line(draft.quantity, draft.unit_price, tax_rate)?;

        Ok(Self {
            id,
            invoice_id,
            article_id: draft.article_id,
            tax_id: tax.map(|t| t.id()),
            tax_rate,
            description,
            quantity: draft.quantity,
            unit_price: draft.unit_price,
            subtotal: amounts.subtotal,
            tax_amount: amounts.tax_amount,
            total: amounts.total,
            sort_order,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a patch and recalculate. `tax` is the tax the line carries after
    /// the update (the caller resolves "unchanged" to the current tax).
    pub fn update(&mut self, patch: ItemPatch, tax: Option<&Tax>, now: DateTime<Utc>) -> DomainResult<()> {
        let description = match patch.description {
            Some(d) => validate_description(&d)?,
            None => self.description.clone(),
        };
        let quantity = patch.quantity.unwrap_or(self.quantity);
        let unit_price = patch.unit_price.unwrap_or(self.unit_price);
        let tax_rate = tax.and_then(Tax::rate);
        let amounts = calculate_line(quantity, unit_price, tax_rate)?;

        self.description = description;
        self.quantity = quantity;
        self.unit_price = unit_price;
        if let Some(article_id) = patch.article_id {
            self.article_id = article_id;
        }
        self.tax_id = tax.map(|t| t.id());
        self.tax_rate = tax_rate;
        self.set_amounts(amounts);
        self.updated_at = now;
        Ok(())
    }

    /// The referenced article was deleted; amounts are unaffected.
    pub fn detach_article(&mut self, now: DateTime<Utc>) {
        self.article_id = None;
        self.updated_at = now;
    }

    pub(crate) fn set_sort_order(&mut self, sort_order: u32) {
        self.sort_order = sort_order;
    }

    fn set_amounts(&mut self, amounts: LineAmounts) {
        self.subtotal = amounts.subtotal;
        self.tax_amount = amounts.tax_amount;
        self.total = amounts.total;
    }

    pub fn invoice_id(&self) -> InvoiceId {
        self.invoice_id
    }

    pub fn article_id(&self) -> Option<ArticleId> {
        self.article_id
    }

    pub fn tax_id(&self) -> Option<TaxId> {
        self.tax_id
    }

    pub fn tax_rate(&self) -> Option<Decimal> {
        self.tax_rate
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    pub fn tax_amount(&self) -> Decimal {
        self.tax_amount
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn amounts(&self) -> LineAmounts {
        LineAmounts {
            subtotal: self.subtotal,
            tax_amount: self.tax_amount,
            total: self.total,
        }
    }

    pub fn sort_order(&self) -> u32 {
        self.sort_order
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceItemRecord {
    pub id: InvoiceItemId,
    pub invoice_id: InvoiceId,
    pub article_id: Option<ArticleId>,
    pub tax_id: Option<TaxId>,
    pub tax_rate: Option<Decimal>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub sort_order: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceItem {
    /// Rebuild an item from a stored row; the stored amounts are kept as is.
    pub fn restore(record: InvoiceItemRecord) -> Self {
        Self {
            id: record.id,
            invoice_id: record.invoice_id,
            article_id: record.article_id,
            tax_id: record.tax_id,
            tax_rate: record.tax_rate,
            description: record.description,
            quantity: record.quantity,
            unit_price: record.unit_price,
            subtotal: record.subtotal,
            tax_amount: record.tax_amount,
            total: record.total,
            sort_order: record.sort_order,
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

impl Entity for InvoiceItem {
    type Id = InvoiceItemId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaxDraft;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn tax(id: i64, rate: Option<Decimal>) -> Tax {
        Tax::create(TaxId::new(id), TaxDraft { rate, name: None }, Utc::now()).unwrap()
    }

    fn draft(quantity: Decimal, unit_price: Decimal) -> ItemDraft {
        ItemDraft {
            description: "Widget".to_string(),
            quantity,
            unit_price,
            article_id: None,
        }
    }

    fn item(quantity: Decimal, unit_price: Decimal, tax: Option<&Tax>) -> InvoiceItem {
        InvoiceItem::create(
            InvoiceItemId::new(1),
            InvoiceId::new(1),
            0,
            draft(quantity, unit_price),
            tax,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn nineteen_percent_on_one_hundred() {
        let vat = tax(1, Some(dec!(19)));
        let line = item(dec!(2), dec!(50.00), Some(&vat));
        assert_eq!(line.subtotal().to_string(), "100.00");
        assert_eq!(line.tax_amount().to_string(), "19.00");
        assert_eq!(line.total().to_string(), "119.00");
        assert_eq!(line.tax_id(), Some(TaxId::new(1)));
    }

    #[test]
    fn exempted_and_untaxed_lines_carry_zero_tax() {
        let exempt = tax(2, None);
        let with_exempt = item(dec!(1), dec!(10.00), Some(&exempt));
        assert_eq!(with_exempt.tax_amount().to_string(), "0.00");
        assert_eq!(with_exempt.total().to_string(), "10.00");
        assert_eq!(with_exempt.tax_id(), Some(TaxId::new(2)));

        let untaxed = item(dec!(1), dec!(10.00), None);
        assert_eq!(untaxed.tax_amount().to_string(), "0.00");
        assert_eq!(untaxed.tax_id(), None);
    }

    #[test]
    fn every_step_truncates() {
        // 3 x 3.333 = 9.999 -> 9.99; 9.99 x 0.08 = 0.7992 -> 0.79
        let amounts = calculate_line(dec!(3), dec!(3.333), Some(dec!(8))).unwrap();
        assert_eq!(amounts.subtotal, dec!(9.99));
        assert_eq!(amounts.tax_amount, dec!(0.79));
        assert_eq!(amounts.total, dec!(10.78));
    }

    #[test]
    fn invalid_lines_are_validation_errors() {
        for (q, p, field) in [
            (dec!(0), dec!(1), "quantity"),
            (dec!(-1), dec!(1), "quantity"),
            (dec!(1), dec!(-0.01), "unit_price"),
        ] {
            match calculate_line(q, p, None) {
                Err(DomainError::Validation { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected validation error, got {other:?}"),
            }
        }

        let err = InvoiceItem::create(
            InvoiceItemId::new(1),
            InvoiceId::new(1),
            0,
            ItemDraft {
                description: "   ".to_string(),
                ..draft(dec!(1), dec!(1))
            },
            None,
            Utc::now(),
        )
        .unwrap_err();
        match err {
            DomainError::Validation { message, .. } => assert_eq!(message, "Item description is required"),
            _ => panic!("Expected Validation error"),
        }
    }

    #[test]
    fn free_lines_are_allowed() {
        let line = item(dec!(5), dec!(0), None);
        assert_eq!(line.total().to_string(), "0.00");
    }

    #[test]
    fn update_recalculates_on_quantity_and_tax_change() {
        let vat = tax(1, Some(dec!(19)));
        let reduced = tax(3, Some(dec!(8)));
        let mut line = item(dec!(2), dec!(50.00), Some(&vat));

        line.update(
            ItemPatch {
                quantity: Some(dec!(3)),
                ..ItemPatch::default()
            },
            Some(&vat),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(line.amounts().total, dec!(178.50));

        line.update(ItemPatch::default(), Some(&reduced), Utc::now()).unwrap();
        assert_eq!(line.tax_amount(), dec!(12.00));
        assert_eq!(line.tax_id(), Some(TaxId::new(3)));

        line.update(ItemPatch::default(), None, Utc::now()).unwrap();
        assert_eq!(line.tax_amount(), dec!(0.00));
        assert_eq!(line.total(), dec!(150.00));
    }

    #[test]
    fn rejected_update_leaves_line_untouched() {
        let mut line = item(dec!(2), dec!(50.00), None);
        let before = line.clone();
        let err = line.update(
            ItemPatch {
                description: Some("New".to_string()),
                quantity: Some(dec!(0)),
                ..ItemPatch::default()
            },
            None,
            Utc::now(),
        );
        assert!(err.is_err());
        assert_eq!(line, before);
    }

    #[test]
    fn amounts_serialize_as_two_place_strings() {
        let line = item(dec!(1), dec!(10), None);
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["subtotal"], "10.00");
        assert_eq!(json["tax_amount"], "0.00");
    }

    fn rate() -> impl Strategy<Value = Option<Decimal>> {
        prop_oneof![
            Just(None),
            Just(Some(Decimal::from(0))),
            Just(Some(Decimal::from(8))),
            Just(Some(Decimal::from(19))),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn subtotal_is_truncated_product(q in 1i64..100_000, p in 0i64..10_000_000, rate in rate()) {
            // q has up to 2 decimals, p up to 3.
            let quantity = Decimal::new(q, 2);
            let unit_price = Decimal::new(p, 3);
            let amounts = calculate_line(quantity, unit_price, rate).unwrap();

            let exact = quantity * unit_price;
            prop_assert!(amounts.subtotal <= exact);
            prop_assert!(exact - amounts.subtotal < dec!(0.01));
            prop_assert_eq!(amounts.subtotal.scale(), 2);
            prop_assert_eq!(amounts.total, amounts.subtotal + amounts.tax_amount);
            prop_assert!(amounts.tax_amount >= Decimal::ZERO);
            if rate.is_none() || rate == Some(Decimal::ZERO) {
                prop_assert_eq!(amounts.tax_amount, Decimal::ZERO);
            }
        }
    }
}

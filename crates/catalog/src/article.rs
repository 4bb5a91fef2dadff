use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invoicer_core::money::{self, MONEY_SCALE};
use invoicer_core::{ArticleId, BusinessId, Decimal, DomainError, DomainResult, Entity};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArticleDraft {
    pub name: String,
    pub unit_price: Decimal,
    pub unit: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArticlePatch {
    pub name: Option<String>,
    pub unit_price: Option<Decimal>,
    pub unit: Option<String>,
    pub description: Option<String>,
}

/// Catalog item belonging to one business.
///
/// Invoice items copy the article's price at the time they are written; later
/// article edits never reprice existing invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    id: ArticleId,
    business_id: BusinessId,
    name: String,
    unit_price: Decimal,
    unit: Option<String>,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Article {
    pub fn create(
        id: ArticleId,
        business_id: BusinessId,
        draft: ArticleDraft,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id,
            business_id,
            name: validate_name(&draft.name)?,
            unit_price: validate_price(draft.unit_price)?,
            unit: blank_to_none(draft.unit),
            description: blank_to_none(draft.description),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn business_id(&self) -> BusinessId {
        self.business_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn belongs_to(&self, business_id: BusinessId) -> bool {
        self.business_id == business_id
    }

    pub fn apply(&mut self, patch: ArticlePatch, now: DateTime<Utc>) -> DomainResult<()> {
        let name = match patch.name {
            Some(name) => validate_name(&name)?,
            None => self.name.clone(),
        };
        let unit_price = match patch.unit_price {
            Some(price) => validate_price(price)?,
            None => self.unit_price,
        };

        self.name = name;
        self.unit_price = unit_price;
        if patch.unit.is_some() {
            self.unit = blank_to_none(patch.unit);
        }
        if patch.description.is_some() {
            self.description = blank_to_none(patch.description);
        }
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    pub id: ArticleId,
    pub business_id: BusinessId,
    pub name: String,
    pub unit_price: Decimal,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn restore(record: ArticleRecord) -> Self {
        Self {
            id: record.id,
            business_id: record.business_id,
            name: record.name,
            unit_price: record.unit_price,
            unit: record.unit,
            description: record.description,
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

impl Entity for Article {
    type Id = ArticleId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

fn validate_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name", "Article name is required"));
    }
    Ok(name.to_string())
}

fn validate_price(price: Decimal) -> DomainResult<Decimal> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(DomainError::validation(
            "unit_price",
            "Unit price must be greater than or equal to 0",
        ));
    }
    Ok(money::truncate(price, MONEY_SCALE))
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn draft(price: Decimal) -> ArticleDraft {
        ArticleDraft {
            name: "Consulting hour".to_string(),
            unit_price: price,
            unit: Some("h".to_string()),
            description: None,
        }
    }

    #[test]
    fn create_stores_price_at_money_scale() {
        let article =
            Article::create(ArticleId::new(1), BusinessId::new(2), draft(dec!(45.5)), Utc::now()).unwrap();
        assert_eq!(article.unit_price().to_string(), "45.50");
        assert!(article.belongs_to(BusinessId::new(2)));
    }

    #[test]
    fn negative_price_is_rejected() {
        let err =
            Article::create(ArticleId::new(1), BusinessId::new(2), draft(dec!(-0.01)), Utc::now()).unwrap_err();
        match err {
            DomainError::Validation { field, .. } => assert_eq!(field, "unit_price"),
            _ => panic!("Expected Validation error"),
        }
    }

    #[test]
    fn blank_name_is_rejected_on_update() {
        let mut article =
            Article::create(ArticleId::new(1), BusinessId::new(2), draft(dec!(1)), Utc::now()).unwrap();
        let err = article
            .apply(
                ArticlePatch {
                    name: Some("   ".to_string()),
                    unit_price: Some(dec!(3)),
                    ..ArticlePatch::default()
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
        // Nothing from the rejected patch sticks.
        assert_eq!(article.unit_price(), dec!(1.00));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, ..ProptestConfig::default() })]

        #[test]
        fn any_non_negative_price_is_accepted(cents in 0i64..100_000_000) {
            let price = Decimal::new(cents, 2);
            let article = Article::create(ArticleId::new(1), BusinessId::new(1), draft(price), Utc::now()).unwrap();
            prop_assert_eq!(article.unit_price(), price);
        }
    }
}

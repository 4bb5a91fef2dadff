//! `invoicer-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! store-assigned identifiers, the domain error model and the fixed-point money
//! helper every calculator builds on.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    ArticleId, BankAccountId, BusinessId, InvoiceId, InvoiceItemId, InvoiceStatusId, TaxId,
    TenantId, UserId,
};
pub use money::{MONEY_SCALE, RATE_SCALE};
pub use rust_decimal::Decimal;

//! Fixed-point money arithmetic.
//!
//! All amounts are exact base-10 decimals. Every operation truncates toward
//! zero at an explicit scale: 2 for money, 4 for the intermediate `rate / 100`
//! factor. Results are always carried at exactly the requested scale so they
//! serialize as `"19.00"`, never `"19"`.

use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{DomainError, DomainResult};

/// Scale of every stored monetary amount.
pub const MONEY_SCALE: u32 = 2;

/// Scale of the intermediate tax factor (`rate / 100`).
pub const RATE_SCALE: u32 = 4;

/// Truncate `value` toward zero to `scale` decimal places.
pub fn truncate(value: Decimal, scale: u32) -> Decimal {
    let mut out = value.round_dp_with_strategy(scale, RoundingStrategy::ToZero);
    out.rescale(scale);
    if out.is_zero() {
        out.set_sign_positive(true);
    }
    out
}

/// Zero at the given scale.
pub fn zero(scale: u32) -> Decimal {
    Decimal::new(0, scale)
}

pub fn add(a: Decimal, b: Decimal, scale: u32) -> DomainResult<Decimal> {
    a.checked_add(b)
        .map(|v| truncate(v, scale))
        .ok_or_else(|| overflow("add"))
}

pub fn mul(a: Decimal, b: Decimal, scale: u32) -> DomainResult<Decimal> {
    a.checked_mul(b)
        .map(|v| truncate(v, scale))
        .ok_or_else(|| overflow("multiply"))
}

pub fn div(a: Decimal, b: Decimal, scale: u32) -> DomainResult<Decimal> {
    if b.is_zero() {
        return Err(DomainError::validation("amount", "division by zero"));
    }
    a.checked_div(b)
        .map(|v| truncate(v, scale))
        .ok_or_else(|| overflow("divide"))
}

/// Sum amounts at `scale`, truncating after each addition.
pub fn sum<I>(values: I, scale: u32) -> DomainResult<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .try_fold(zero(scale), |acc, v| add(acc, v, scale))
}

/// Parse a decimal string supplied for `field`.
pub fn parse(field: &str, raw: &str) -> DomainResult<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|_| DomainError::validation(field, format!("{field} must be a number")))
}

fn overflow(op: &str) -> DomainError {
    DomainError::validation("amount", format!("amount out of range ({op})"))
}

//! Value objects shared by the storefront aggregates

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coupon code value object, stored trimmed and upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CouponCode(String);

impl CouponCode {
    pub const MAX_LEN: usize = 32;

    pub fn new(value: impl AsRef<str>) -> Result<Self, CouponCodeError> {
        let value = value.as_ref().trim().to_uppercase();
        if value.is_empty() { return Err(CouponCodeError::Empty); }
        if value.chars().count() > Self::MAX_LEN { return Err(CouponCodeError::TooLong); }
        if value.chars().any(char::is_whitespace) { return Err(CouponCodeError::Whitespace); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponCodeError {
    #[error("coupon code is empty")]
    Empty,
    #[error("coupon code is longer than 32 characters")]
    TooLong,
    #[error("coupon code must not contain whitespace")]
    Whitespace,
}

/// Percentage in the closed range 0..=100.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub const ZERO: Percentage = Percentage(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, PercentageError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(PercentageError::OutOfRange(value));
        }
        Ok(Self(value))
    }
    pub fn value(&self) -> Decimal { self.0 }

    /// `amount × pct / 100`, rounded to currency precision.
    pub fn of(&self, amount: Decimal) -> Decimal { round_money(amount * self.0 / Decimal::ONE_HUNDRED) }
}

impl TryFrom<Decimal> for Percentage {
    type Error = PercentageError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Percentage> for Decimal {
    fn from(p: Percentage) -> Self { p.0 }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}%", self.0.normalize()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PercentageError {
    #[error("percentage {0} is outside 0..=100")]
    OutOfRange(Decimal),
}

/// Rounds an amount to two decimal places, midpoint away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Reference to an image held by the external media host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub public_id: String,
}

/// One-based page request. `limit` is clamped to `1..=MAX_LIMIT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest { pub page: u32, pub limit: u32 }

impl PageRequest {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self { page: page.unwrap_or(1).max(1), limit: limit.unwrap_or(default_limit).clamp(1, Self::MAX_LIMIT) }
    }
    pub fn offset(&self) -> u64 { u64::from(self.page - 1) * u64::from(self.limit) }
    pub fn total_pages(&self, total: u64) -> u64 { total.div_ceil(u64::from(self.limit)) }
}

impl Default for PageRequest { fn default() -> Self { Self::new(None, None, 10) } }

/// One page of results plus the unpaginated total.
#[derive(Clone, Debug)]
pub struct Page<T> { pub items: Vec<T>, pub total: u64 }

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn coupon_code_is_normalized() {
        let code = CouponCode::new("  save10 ").unwrap();
        assert_eq!(code.as_str(), "SAVE10");
        assert_eq!(CouponCode::new("   "), Err(CouponCodeError::Empty));
        assert_eq!(CouponCode::new("SAVE 10"), Err(CouponCodeError::Whitespace));
    }

    #[test]
    fn percentage_bounds() {
        assert!(Percentage::new(dec!(100)).is_ok());
        assert!(Percentage::new(dec!(100.01)).is_err());
        assert!(Percentage::new(dec!(-1)).is_err());
        assert_eq!(Percentage::new(dec!(10)).unwrap().of(dec!(1000)), dec!(100));
        assert_eq!(Percentage::new(dec!(15)).unwrap().of(dec!(33.33)), dec!(5.00));
    }

    #[test]
    fn page_math() {
        let page = PageRequest::new(Some(3), Some(10), 20);
        assert_eq!(page.offset(), 20);
        assert_eq!(page.total_pages(21), 3);
        assert_eq!(PageRequest::new(Some(0), Some(1000), 10).limit, 100);
    }
}

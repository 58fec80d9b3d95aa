//! Coupon Aggregate

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{CouponCode, CouponCodeError, Percentage};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    pub code: CouponCode,
    /// Percentage taken off the cart total.
    pub discount: Percentage,
    pub max_limit: u32,
    pub min_order_amount: Decimal,
    pub start_date: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub used_count: u32,
    pub is_active: bool,
    /// Categories the coupon is restricted to; empty means unrestricted.
    pub applicable_categories: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewCoupon {
    pub code: String,
    pub discount: Decimal,
    pub max_limit: u32,
    pub min_order_amount: Decimal,
    pub start_date: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub applicable_categories: Vec<Uuid>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponPatch {
    pub code: Option<String>,
    pub discount: Option<Decimal>,
    pub max_limit: Option<u32>,
    pub min_order_amount: Option<Decimal>,
    pub start_date: Option<DateTime<Utc>>,
    pub expiry: Option<DateTime<Utc>>,
    pub applicable_categories: Option<Vec<Uuid>>,
    pub is_active: Option<bool>,
}

impl Coupon {
    pub fn create(draft: NewCoupon, now: DateTime<Utc>) -> Result<Self, CouponError> {
        let mut coupon = Self {
            id: Uuid::now_v7(),
            code: CouponCode::new(&draft.code)?,
            discount: coupon_percentage(draft.discount)?,
            max_limit: draft.max_limit,
            min_order_amount: draft.min_order_amount,
            start_date: draft.start_date,
            expiry: draft.expiry,
            used_count: 0,
            is_active: true,
            applicable_categories: dedup(draft.applicable_categories),
            created_at: now,
            updated_at: now,
        };
        coupon.validate(now, true)?;
        Ok(coupon)
    }

    /// A past expiry is only rejected when the patch sets a new one; editing an
    /// already expired coupon keeps it inactive.
    pub fn apply(&mut self, patch: CouponPatch, now: DateTime<Utc>) -> Result<(), CouponError> {
        let new_expiry = patch.expiry.is_some();
        if let Some(code) = patch.code { self.code = CouponCode::new(code)?; }
        if let Some(discount) = patch.discount { self.discount = coupon_percentage(discount)?; }
        if let Some(max_limit) = patch.max_limit { self.max_limit = max_limit; }
        if let Some(min) = patch.min_order_amount { self.min_order_amount = min; }
        if let Some(start) = patch.start_date { self.start_date = start; }
        if let Some(expiry) = patch.expiry { self.expiry = expiry; }
        if let Some(categories) = patch.applicable_categories { self.applicable_categories = dedup(categories); }
        if let Some(active) = patch.is_active { self.is_active = active; }
        self.validate(now, new_expiry)?;
        self.updated_at = now;
        Ok(())
    }

    fn validate(&mut self, now: DateTime<Utc>, future_expiry: bool) -> Result<(), CouponError> {
        if self.max_limit == 0 { return Err(CouponError::InvalidMaxLimit); }
        if self.min_order_amount < Decimal::ZERO { return Err(CouponError::InvalidMinimum(self.min_order_amount)); }
        if self.start_date >= self.expiry { return Err(CouponError::StartAfterExpiry); }
        if future_expiry && self.expiry <= now { return Err(CouponError::ExpiryInPast); }
        self.refresh_activity(now);
        Ok(())
    }

    /// Deactivates the coupon once its expiry has passed.
    pub fn refresh_activity(&mut self, now: DateTime<Utc>) {
        if now > self.expiry { self.is_active = false; }
    }

    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= now && now <= self.expiry
    }

    pub fn is_exhausted(&self) -> bool { self.used_count >= self.max_limit }

    /// Every category in the cart must be allowed; an empty allow-list allows all.
    pub fn covers_all(&self, categories: &BTreeSet<Uuid>) -> bool {
        self.applicable_categories.is_empty() || categories.iter().all(|c| self.applicable_categories.contains(c))
    }

    /// Whether the coupon is worth offering for a cart spanning `categories`.
    pub fn offered_for(&self, categories: &BTreeSet<Uuid>) -> bool {
        self.applicable_categories.is_empty() || categories.iter().any(|c| self.applicable_categories.contains(c))
    }

    /// Checks every redemption rule against a cart's total and categories.
    pub fn check_redeemable(&self, now: DateTime<Utc>, cart_total: Decimal, categories: &BTreeSet<Uuid>) -> Result<(), CouponError> {
        if !self.is_active || now > self.expiry { return Err(CouponError::InvalidOrExpired); }
        if now < self.start_date { return Err(CouponError::NotYetValid(self.start_date)); }
        if self.is_exhausted() { return Err(CouponError::UsageLimitReached); }
        if cart_total < self.min_order_amount { return Err(CouponError::MinimumNotMet(self.min_order_amount)); }
        if !self.covers_all(categories) { return Err(CouponError::NotApplicableToAllItems); }
        Ok(())
    }

    pub fn discount_on(&self, total: Decimal) -> Decimal { self.discount.of(total) }
}

fn coupon_percentage(value: Decimal) -> Result<Percentage, CouponError> {
    if value < Decimal::ONE { return Err(CouponError::InvalidDiscount(value)); }
    Percentage::new(value).map_err(|_| CouponError::InvalidDiscount(value))
}

fn dedup(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("Invalid coupon code: {0}")]
    InvalidCode(#[from] CouponCodeError),
    #[error("Coupon discount must be between 1 and 100, got {0}")]
    InvalidDiscount(Decimal),
    #[error("Coupon usage limit must be at least 1")]
    InvalidMaxLimit,
    #[error("Minimum order amount cannot be negative, got {0}")]
    InvalidMinimum(Decimal),
    #[error("Start date must be before expiry date.")]
    StartAfterExpiry,
    #[error("Expiry date must be in the future.")]
    ExpiryInPast,
    #[error("Invalid or expired coupon code")]
    InvalidOrExpired,
    #[error("Coupon is not valid before {0}")]
    NotYetValid(DateTime<Utc>),
    #[error("Coupon usage limit reached")]
    UsageLimitReached,
    #[error("Cart total must be at least {0} to use this coupon")]
    MinimumNotMet(Decimal),
    #[error("This coupon is not applicable to all items in your cart")]
    NotApplicableToAllItems,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    pub(crate) fn coupon(code: &str, discount: Decimal, categories: Vec<Uuid>) -> Coupon {
        let now = Utc::now();
        Coupon::create(NewCoupon {
            code: code.into(), discount, max_limit: 100, min_order_amount: Decimal::ZERO,
            start_date: now - Duration::days(1), expiry: now + Duration::days(30), applicable_categories: categories,
        }, now)
        .unwrap()
    }

    #[test]
    fn create_validates_window() {
        let now = Utc::now();
        let draft = NewCoupon {
            code: "x".into(), discount: dec!(10), max_limit: 5, min_order_amount: Decimal::ZERO,
            start_date: now + Duration::days(2), expiry: now + Duration::days(1), applicable_categories: vec![],
        };
        assert_eq!(Coupon::create(draft.clone(), now), Err(CouponError::StartAfterExpiry));
        let past = NewCoupon { start_date: now - Duration::days(3), expiry: now - Duration::days(1), ..draft.clone() };
        assert_eq!(Coupon::create(past, now), Err(CouponError::ExpiryInPast));
        let zero = NewCoupon { discount: dec!(0.5), start_date: now, expiry: now + Duration::days(1), ..draft };
        assert_eq!(Coupon::create(zero, now), Err(CouponError::InvalidDiscount(dec!(0.5))));
    }

    #[test]
    fn category_coverage_requires_every_category() {
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let c = coupon("KITCHEN", dec!(10), vec![a]);
        assert!(c.covers_all(&BTreeSet::from([a])));
        assert!(!c.covers_all(&BTreeSet::from([a, b])));
        assert!(c.offered_for(&BTreeSet::from([a, b])));
        assert!(coupon("ALL", dec!(5), vec![]).covers_all(&BTreeSet::from([a, b])));
    }

    #[test]
    fn redemption_rules() {
        let now = Utc::now();
        let mut c = coupon("SAVE10", dec!(10), vec![]);
        assert!(c.check_redeemable(now, dec!(100), &BTreeSet::new()).is_ok());
        c.min_order_amount = dec!(500);
        assert_eq!(c.check_redeemable(now, dec!(100), &BTreeSet::new()), Err(CouponError::MinimumNotMet(dec!(500))));
        c.min_order_amount = Decimal::ZERO;
        c.used_count = c.max_limit;
        assert_eq!(c.check_redeemable(now, dec!(100), &BTreeSet::new()), Err(CouponError::UsageLimitReached));
        c.used_count = 0;
        c.expiry = now - Duration::seconds(1);
        assert_eq!(c.check_redeemable(now, dec!(100), &BTreeSet::new()), Err(CouponError::InvalidOrExpired));
        c.refresh_activity(now);
        assert!(!c.is_active);
    }

    #[test]
    fn patch_renormalizes_code() {
        let now = Utc::now();
        let mut c = coupon("old", dec!(10), vec![]);
        c.apply(CouponPatch { code: Some(" new20 ".into()), discount: Some(dec!(20)), ..Default::default() }, now).unwrap();
        assert_eq!(c.code.as_str(), "NEW20");
        assert_eq!(c.discount_on(dec!(250)), dec!(50));
    }

    #[test]
    fn expired_coupon_stays_editable_but_inactive() {
        let now = Utc::now();
        let mut c = coupon("LAPSED", dec!(10), vec![]);
        c.start_date = now - Duration::days(10);
        c.expiry = now - Duration::days(1);

        c.apply(CouponPatch { discount: Some(dec!(15)), is_active: Some(true), ..Default::default() }, now).unwrap();
        assert_eq!(c.discount.value(), dec!(15));
        assert!(!c.is_active);

        let stale = CouponPatch { expiry: Some(now - Duration::hours(1)), ..Default::default() };
        assert_eq!(c.apply(stale, now), Err(CouponError::ExpiryInPast));
        c.apply(CouponPatch { expiry: Some(now + Duration::days(5)), is_active: Some(true), ..Default::default() }, now).unwrap();
        assert!(c.is_active);
    }
}

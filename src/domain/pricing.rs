//! Cart pricing engine.
//!
//! Derives a cart's aggregate amounts from its line totals and the discount
//! stored when a coupon was applied. Carts call [`price`] after every
//! mutation so the stored aggregates always match the stored lines.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::round_money;

/// Orders strictly above this amount ship free.
pub const FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(999, 0, 0, false, 0);
/// Flat shipping fee charged below the threshold.
pub const FLAT_SHIPPING_FEE: Decimal = Decimal::from_parts(50, 0, 0, false, 0);
/// GST applied to the discounted subtotal (18%).
pub const TAX_RATE: Decimal = Decimal::from_parts(18, 0, 0, false, 2);

/// Aggregate amounts stored on a cart and copied onto its order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub shipping_charge: Decimal,
    pub shipping_discount: Decimal,
    pub tax_amount: Decimal,
    pub final_amount: Decimal,
}

/// Prices a cart.
///
/// `discount` is the frozen coupon discount; it is not rescaled when the line
/// totals change, only clamped so it never exceeds the total. The waived
/// shipping fee is reported as `shipping_discount` but is not subtracted from
/// `final_amount`.
pub fn price<I>(line_totals: I, discount: Decimal) -> CartTotals
where
    I: IntoIterator<Item = Decimal>,
{
    let total_amount: Decimal = line_totals.into_iter().sum();
    let discount_amount = round_money(discount.max(Decimal::ZERO).min(total_amount));
    let free_shipping = total_amount > FREE_SHIPPING_THRESHOLD;
    let shipping_charge = if free_shipping { Decimal::ZERO } else { FLAT_SHIPPING_FEE };
    let shipping_discount = if free_shipping { FLAT_SHIPPING_FEE } else { Decimal::ZERO };
    let tax_amount = round_money((total_amount - discount_amount) * TAX_RATE);
    let final_amount = total_amount - discount_amount + shipping_charge + tax_amount;

    CartTotals { total_amount, discount_amount, shipping_charge, shipping_discount, tax_amount, final_amount }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn free_shipping_above_threshold() {
        let totals = price([dec!(1000)], Decimal::ZERO);
        assert_eq!(totals.total_amount, dec!(1000));
        assert_eq!(totals.shipping_charge, dec!(0));
        assert_eq!(totals.shipping_discount, dec!(50));
        assert_eq!(totals.tax_amount, dec!(180));
        assert_eq!(totals.final_amount, dec!(1180));
    }

    #[test]
    fn frozen_discount_reduces_taxable_amount() {
        let totals = price([dec!(1000)], dec!(100));
        assert_eq!(totals.discount_amount, dec!(100));
        assert_eq!(totals.tax_amount, dec!(162));
        assert_eq!(totals.final_amount, dec!(1062));
    }

    #[test]
    fn threshold_is_exclusive() {
        let totals = price([dec!(999)], Decimal::ZERO);
        assert_eq!(totals.shipping_charge, dec!(50));
        assert_eq!(totals.shipping_discount, dec!(0));
        assert_eq!(totals.final_amount, dec!(999) + dec!(50) + dec!(179.82));
    }

    #[test]
    fn discount_never_exceeds_total() {
        let totals = price([dec!(40)], dec!(100));
        assert_eq!(totals.discount_amount, dec!(40));
        assert_eq!(totals.tax_amount, dec!(0));
        assert_eq!(totals.final_amount, dec!(50));
    }

    #[test]
    fn empty_cart_still_charges_shipping() {
        let totals = price(std::iter::empty(), Decimal::ZERO);
        assert_eq!(totals.total_amount, dec!(0));
        assert_eq!(totals.final_amount, dec!(50));
    }

    #[test]
    fn final_amount_identity_holds_for_odd_amounts() {
        for (lines, discount) in [
            (vec![dec!(333.33), dec!(0.01)], dec!(33.33)),
            (vec![dec!(12.49); 7], dec!(0)),
            (vec![dec!(1999.99)], dec!(299.99)),
        ] {
            let t = price(lines, discount);
            assert_eq!(t.final_amount, t.total_amount - t.discount_amount + t.shipping_charge + t.tax_amount);
            let raw_tax = (t.total_amount - t.discount_amount) * TAX_RATE;
            assert!((t.tax_amount - raw_tax).abs() <= dec!(0.005));
        }
    }
}

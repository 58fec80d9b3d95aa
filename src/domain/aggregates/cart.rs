//! Cart Aggregate
//!
//! One cart per user. Every mutation re-runs the pricing engine, so the stored
//! totals are always a function of the stored lines and the frozen coupon
//! discount.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::coupon::{Coupon, CouponError};
use crate::domain::aggregates::product::Product;
use crate::domain::pricing::{self, CartTotals};
use crate::domain::value_objects::{round_money, CouponCode, Percentage};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    id: Uuid,
    user_id: Uuid,
    items: Vec<CartLine>,
    applied_coupon: Option<AppliedCoupon>,
    #[serde(flatten)]
    totals: CartTotals,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: u32,
    /// Unit list price captured when the product was added.
    pub price: Decimal,
    /// Per-unit markdown captured alongside `price`.
    pub unit_discount: Decimal,
    /// Line markdown: `unit_discount × quantity`.
    pub discount: Decimal,
    /// `price × quantity − discount`.
    pub total: Decimal,
}

impl CartLine {
    fn new(product: &Product, quantity: u32) -> Self {
        let unit_discount = (product.price - product.discounted_price).max(Decimal::ZERO);
        let mut line = Self { product_id: product.id, quantity, price: product.price, unit_discount, discount: Decimal::ZERO, total: Decimal::ZERO };
        line.recompute();
        line
    }

    fn recompute(&mut self) {
        let qty = Decimal::from(self.quantity);
        self.discount = round_money(self.unit_discount * qty);
        self.total = round_money(self.price * qty) - self.discount;
    }
}

/// Coupon reference kept on a cart (and copied onto its order).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCoupon {
    pub id: Uuid,
    pub code: CouponCode,
    pub discount: Percentage,
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        let mut cart = Self {
            id: Uuid::now_v7(), user_id, items: vec![], applied_coupon: None,
            totals: CartTotals::default(), created_at: now, updated_at: now,
        };
        cart.reprice();
        cart
    }

    /// Rebuilds a cart from storage, re-deriving the totals.
    pub(crate) fn from_parts(
        id: Uuid, user_id: Uuid, items: Vec<CartLine>, applied_coupon: Option<AppliedCoupon>,
        discount_amount: Decimal, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        let mut cart = Self { id, user_id, items, applied_coupon, totals: CartTotals::default(), created_at, updated_at };
        cart.totals.discount_amount = discount_amount;
        cart.totals = pricing::price(cart.items.iter().map(|l| l.total), discount_amount);
        cart
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn items(&self) -> &[CartLine] { &self.items }
    pub fn applied_coupon(&self) -> Option<&AppliedCoupon> { self.applied_coupon.as_ref() }
    pub fn totals(&self) -> &CartTotals { &self.totals }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn product_ids(&self) -> Vec<Uuid> { self.items.iter().map(|i| i.product_id).collect() }

    /// Adds units of a product, merging with an existing line for it.
    pub fn add_item(&mut self, product: &Product, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 { return Err(CartError::InvalidQuantity); }
        if !product.is_available() { return Err(CartError::ProductUnavailable(product.name.clone())); }
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == product.id) {
            existing.quantity = existing.quantity.checked_add(quantity).ok_or(CartError::InvalidQuantity)?;
            existing.recompute();
        } else {
            self.items.push(CartLine::new(product, quantity));
        }
        self.reprice();
        Ok(())
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn update_quantity(&mut self, product_id: Uuid, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 { return self.remove_item(product_id); }
        let item = self.items.iter_mut().find(|i| i.product_id == product_id).ok_or(CartError::ItemNotFound)?;
        item.quantity = quantity;
        item.recompute();
        self.reprice();
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.reprice();
        Ok(())
    }

    /// Applies `coupon`, replacing any coupon already on the cart.
    ///
    /// `categories` is the set of categories the cart's products belong to.
    /// Validation happens before the current coupon is cleared, so a rejected
    /// coupon leaves the cart untouched. The discount is computed once, here,
    /// and then stays frozen through later mutations.
    pub fn apply_coupon(&mut self, coupon: &Coupon, categories: &BTreeSet<Uuid>, now: DateTime<Utc>) -> Result<Decimal, CartError> {
        if self.is_empty() { return Err(CartError::Empty); }
        coupon.check_redeemable(now, self.totals.total_amount, categories)?;
        self.clear_coupon();
        let discount = coupon.discount_on(self.totals.total_amount);
        self.applied_coupon = Some(AppliedCoupon { id: coupon.id, code: coupon.code.clone(), discount: coupon.discount });
        self.totals.discount_amount = discount;
        self.reprice();
        Ok(self.totals.discount_amount)
    }

    /// Drops the applied coupon and its discount. Returns whether one was set.
    pub fn remove_coupon(&mut self) -> bool {
        let had = self.applied_coupon.is_some();
        self.clear_coupon();
        had
    }

    fn clear_coupon(&mut self) {
        self.applied_coupon = None;
        self.totals.discount_amount = Decimal::ZERO;
        self.reprice();
    }

    fn reprice(&mut self) {
        self.totals = pricing::price(self.items.iter().map(|l| l.total), self.totals.discount_amount);
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Quantity must be at least 1")]
    InvalidQuantity,
    #[error("Item not found in cart")]
    ItemNotFound,
    #[error("Cart is empty")]
    Empty,
    #[error("{0} is no longer available")]
    ProductUnavailable(String),
    #[error(transparent)]
    Coupon(#[from] CouponError),
}

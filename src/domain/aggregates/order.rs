//! Order Aggregate
//!
//! An order is a frozen copy of a cart at checkout: product lines, amounts and
//! the shipping address are denormalized so later catalog edits never reach
//! it. After creation only the status (and its paid flags) may change.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::address::{Address, AddressType};
use crate::domain::aggregates::cart::{AppliedCoupon, Cart};
use crate::domain::aggregates::product::Product;
use crate::domain::pricing::CartTotals;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: Uuid,
    user_id: Uuid,
    products: Vec<OrderLine>,
    #[serde(flatten)]
    totals: CartTotals,
    coupon: Option<AppliedCoupon>,
    address: ShippingAddress,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    order_status: OrderStatus,
    is_paid: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: Uuid,
    pub name: String,
    pub images: Vec<String>,
    pub price: Decimal,
    pub quantity: u32,
    pub discount: Decimal,
    pub final_price: Decimal,
}

/// Postal address copied onto the order at checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone_number: String,
    pub alternate_phone_number: Option<String>,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub address_type: AddressType,
}

impl From<&Address> for ShippingAddress {
    fn from(a: &Address) -> Self {
        Self {
            full_name: a.full_name.clone(), phone_number: a.phone_number.clone(),
            alternate_phone_number: a.alternate_phone_number.clone(), street_address: a.street_address.clone(),
            city: a.city.clone(), state: a.state.clone(), postal_code: a.postal_code.clone(),
            country: a.country.clone(), address_type: a.address_type,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus { #[default] Pending, Processing, Confirmed, Shipped, Delivered, Cancelled }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus { #[default] Pending, Paid, Failed }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "COD")] Cod,
    #[serde(rename = "UPI")] Upi,
    Card,
    #[serde(rename = "Net Banking")] NetBanking,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [Self::Pending, Self::Processing, Self::Confirmed, Self::Shipped, Self::Delivered, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Confirmed => "Confirmed",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    /// Position along the fulfilment path; `Cancelled` is off the path.
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Processing => Some(1),
            Self::Confirmed => Some(2),
            Self::Shipped => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled => None,
        }
    }

    /// Admin transitions move forward along the fulfilment path (steps may be
    /// skipped) or cancel any order not yet terminal.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() || *self == next { return false; }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to > from,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| OrderError::InvalidStatus(s.to_string()))
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "Pending", Self::Paid => "Paid", Self::Failed => "Failed" }
    }
}

impl FromStr for PaymentStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Failed" => Ok(Self::Failed),
            other => Err(OrderError::InvalidPaymentStatus(other.to_string())),
        }
    }
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Cod => "COD", Self::Upi => "UPI", Self::Card => "Card", Self::NetBanking => "Net Banking" }
    }

    /// Cash on delivery is the only method checkout accepts.
    pub fn ensure_accepted(&self) -> Result<(), OrderError> {
        if *self == Self::Cod { Ok(()) } else { Err(OrderError::UnsupportedPaymentMethod) }
    }
}

impl FromStr for PaymentMethod {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COD" => Ok(Self::Cod),
            "UPI" => Ok(Self::Upi),
            "Card" => Ok(Self::Card),
            "Net Banking" => Ok(Self::NetBanking),
            _ => Err(OrderError::UnsupportedPaymentMethod),
        }
    }
}

impl Order {
    /// Snapshots `cart` into a new pending order.
    ///
    /// `products` must hold the live record of every product in the cart;
    /// names and images are copied from there, prices from the cart lines.
    pub fn from_cart(cart: &Cart, products: &[Product], address: &Address, payment_method: PaymentMethod) -> Result<Self, OrderError> {
        payment_method.ensure_accepted()?;
        if cart.is_empty() { return Err(OrderError::EmptyCart); }
        let lines = cart.items().iter().map(|item| {
            let product = products.iter().find(|p| p.id == item.product_id).ok_or(OrderError::ProductMissing(item.product_id))?;
            Ok(OrderLine {
                product_id: item.product_id, name: product.name.clone(), images: product.image_urls(),
                price: item.price, quantity: item.quantity, discount: item.discount, final_price: item.total,
            })
        }).collect::<Result<Vec<_>, OrderError>>()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), user_id: cart.user_id(), products: lines, totals: *cart.totals(),
            coupon: cart.applied_coupon().cloned(), address: ShippingAddress::from(address), payment_method,
            payment_status: PaymentStatus::Pending, order_status: OrderStatus::Pending, is_paid: false,
            created_at: now, updated_at: now,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: Uuid, user_id: Uuid, products: Vec<OrderLine>, totals: CartTotals, coupon: Option<AppliedCoupon>,
        address: ShippingAddress, payment_method: PaymentMethod, payment_status: PaymentStatus,
        order_status: OrderStatus, is_paid: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, user_id, products, totals, coupon, address, payment_method, payment_status, order_status, is_paid, created_at, updated_at }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn products(&self) -> &[OrderLine] { &self.products }
    pub fn totals(&self) -> &CartTotals { &self.totals }
    pub fn coupon(&self) -> Option<&AppliedCoupon> { self.coupon.as_ref() }
    pub fn address(&self) -> &ShippingAddress { &self.address }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn status(&self) -> OrderStatus { self.order_status }
    pub fn is_paid(&self) -> bool { self.is_paid }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_owned_by(&self, user_id: Uuid) -> bool { self.user_id == user_id }

    /// `(product, quantity)` pairs to hand back to stock on cancellation.
    pub fn restock_lines(&self) -> Vec<(Uuid, u32)> { self.products.iter().map(|l| (l.product_id, l.quantity)).collect() }

    /// Customer cancellation, allowed only while the order is still pending.
    pub fn cancel_by_customer(&mut self) -> Result<(), OrderError> {
        if self.order_status != OrderStatus::Pending { return Err(OrderError::NotCancellable); }
        self.order_status = OrderStatus::Cancelled;
        self.touch();
        Ok(())
    }

    /// Admin status change. Returns the previous status.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<OrderStatus, OrderError> {
        let from = self.order_status;
        if !from.can_transition_to(next) { return Err(OrderError::InvalidTransition { from, to: next }); }
        self.order_status = next;
        // COD is settled on the doorstep.
        if next == OrderStatus::Delivered && self.payment_method == PaymentMethod::Cod {
            self.payment_status = PaymentStatus::Paid;
            self.is_paid = true;
        }
        self.touch();
        Ok(from)
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Invalid payment method, only COD is available.")]
    UnsupportedPaymentMethod,
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Product {0} no longer exists")]
    ProductMissing(Uuid),
    #[error("Order cannot be canceled at this stage")]
    NotCancellable,
    #[error("Invalid order status: {0}")]
    InvalidStatus(String),
    #[error("Invalid payment status: {0}")]
    InvalidPaymentStatus(String),
    #[error("Cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::address::tests::address;
    use crate::domain::aggregates::product::tests::product;
    use rust_decimal_macros::dec;

    fn placed() -> Order {
        let user = Uuid::now_v7();
        let a = product("Kettle", Uuid::now_v7(), dec!(500), 5);
        let mut cart = Cart::new(user);
        cart.add_item(&a, 2).unwrap();
        Order::from_cart(&cart, &[a], &address(user), PaymentMethod::Cod).unwrap()
    }

    #[test]
    fn snapshot_copies_lines_and_totals() {
        let order = placed();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.products()[0].name, "Kettle");
        assert_eq!(order.products()[0].final_price, dec!(1000));
        assert_eq!(order.totals().final_amount, dec!(1180));
        assert_eq!(order.address().country, "India");
    }

    #[test]
    fn only_cod_is_accepted() {
        let user = Uuid::now_v7();
        let a = product("Kettle", Uuid::now_v7(), dec!(500), 5);
        let mut cart = Cart::new(user);
        cart.add_item(&a, 1).unwrap();
        let err = Order::from_cart(&cart, &[a], &address(user), PaymentMethod::Card).unwrap_err();
        assert_eq!(err.to_string(), "Invalid payment method, only COD is available.");
        assert_eq!("Cash".parse::<PaymentMethod>(), Err(OrderError::UnsupportedPaymentMethod));
    }

    #[test]
    fn customer_cancel_only_while_pending() {
        let mut order = placed();
        order.transition_to(OrderStatus::Processing).unwrap();
        assert_eq!(order.cancel_by_customer(), Err(OrderError::NotCancellable));
        let mut fresh = placed();
        fresh.cancel_by_customer().unwrap();
        assert_eq!(fresh.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn admin_transitions() {
        let mut order = placed();
        assert_eq!(order.transition_to(OrderStatus::Shipped), Ok(OrderStatus::Pending));
        assert!(order.transition_to(OrderStatus::Confirmed).is_err());
        order.transition_to(OrderStatus::Delivered).unwrap();
        assert!(order.is_paid());
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        assert!(order.transition_to(OrderStatus::Cancelled).is_err());
    }

    #[test]
    fn status_parsing() {
        assert_eq!("Shipped".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        assert_eq!("shipped".parse::<OrderStatus>(), Err(OrderError::InvalidStatus("shipped".into())));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Pending));
    }
}

//! Domain events
//!
//! Published after the state change they describe has been committed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{OrderStatus, StockAction};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Catalog(CatalogEvent),
    Cart(CartEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, final_amount: Decimal, coupon_code: Option<String>, at: DateTime<Utc> },
    Cancelled { order_id: Uuid, user_id: Uuid, at: DateTime<Utc> },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus, at: DateTime<Utc> },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CatalogEvent {
    StockAdjusted { product_id: Uuid, action: StockAction, quantity: u32, stock: u32 },
    CategoryDeleted { category_id: Uuid, products: u64 },
    CategoryRestored { category_id: Uuid, products: u64 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CartEvent {
    CouponApplied { cart_id: Uuid, user_id: Uuid, code: String, discount: Decimal },
    Expired { purged: u64 },
}

impl DomainEvent {
    /// Dotted name appended to the subject prefix when published.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Placed { .. }) => "order.placed",
            Self::Order(OrderEvent::Cancelled { .. }) => "order.cancelled",
            Self::Order(OrderEvent::StatusChanged { .. }) => "order.status_changed",
            Self::Catalog(CatalogEvent::StockAdjusted { .. }) => "catalog.stock_adjusted",
            Self::Catalog(CatalogEvent::CategoryDeleted { .. }) => "catalog.category_deleted",
            Self::Catalog(CatalogEvent::CategoryRestored { .. }) => "catalog.category_restored",
            Self::Cart(CartEvent::CouponApplied { .. }) => "cart.coupon_applied",
            Self::Cart(CartEvent::Expired { .. }) => "cart.expired",
        }
    }
}

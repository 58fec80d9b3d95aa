//! Persistence seam.
//!
//! Each concern gets its own repository trait; [`Store`] bundles them so the
//! HTTP layer can hold a single `Arc<dyn Store>`. Multi-record writes that must
//! be all-or-nothing (checkout, cancellation restock, category cascade) are
//! single trait methods so each backend can make them atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{
    Address, Cart, Category, CategorySummary, Coupon, DefectiveProduct, Offer, Order, OrderStatus, PaymentMethod,
    PaymentStatus, Product, StockAction, StockFilter, User, UserStatus,
};
use crate::domain::value_objects::{CouponCode, Page, PageRequest};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("Insufficient stock for: {}", .0.join(", "))]
    InsufficientStock(Vec<String>),
    #[error("Coupon {0} has reached its usage limit")]
    CouponExhausted(String),
    #[error("Order is no longer {expected}")]
    StaleStatus { expected: OrderStatus },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Product listing filters.
#[derive(Clone, Debug, Default)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub stock: Option<StockFilter>,
    /// When set, only soft-deleted products are listed.
    pub show_deleted: bool,
    pub category_id: Option<Uuid>,
    pub page: PageRequest,
}

impl ProductQuery {
    pub fn matches(&self, product: &Product) -> bool {
        product.is_deleted == self.show_deleted
            && self.category_id.map_or(true, |c| product.category_id == c)
            && self.stock.map_or(true, |f| f.matches(product.stock))
            && self.search.as_deref().map_or(true, |s| product.name.to_lowercase().contains(&s.to_lowercase()))
    }
}

/// A product together with the name of its category.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListing {
    #[serde(flatten)]
    pub product: Product,
    pub category_name: Option<String>,
}

/// Admin order listing filters. Date bounds are inclusive.
#[derive(Clone, Debug, Default)]
pub struct OrderQuery {
    pub user_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Matches an order id or user id by prefix.
    pub search: Option<String>,
    pub page: PageRequest,
}

impl OrderQuery {
    pub fn matches(&self, order: &Order) -> bool {
        let search = self.search.as_deref().map(str::to_lowercase);
        self.user_id.map_or(true, |u| order.user_id() == u)
            && self.status.map_or(true, |s| order.status() == s)
            && self.payment_status.map_or(true, |s| order.payment_status() == s)
            && self.payment_method.map_or(true, |m| order.payment_method() == m)
            && self.from.map_or(true, |from| order.created_at() >= from)
            && self.until.map_or(true, |until| order.created_at() <= until)
            && search.map_or(true, |s| order.id().to_string().starts_with(&s) || order.user_id().to_string().starts_with(&s))
    }
}

/// Admin user listing filters.
#[derive(Clone, Debug, Default)]
pub struct UserQuery {
    /// Case-insensitive substring of name or email.
    pub search: Option<String>,
    pub page: PageRequest,
}

impl UserQuery {
    pub fn matches(&self, user: &User) -> bool {
        self.search.as_deref().map(str::to_lowercase).map_or(true, |s| {
            user.name.to_lowercase().contains(&s) || user.email.contains(&s)
        })
    }
}

/// Everything a checkout commits at once.
#[derive(Clone, Debug)]
pub struct Checkout {
    pub order: Order,
    pub cart_id: Uuid,
    /// Coupon whose usage counter is incremented, if one was applied.
    pub coupon_id: Option<Uuid>,
}

/// Status write guarded by the status the caller observed.
#[derive(Clone, Debug)]
pub struct StatusChange {
    pub order: Order,
    pub expected: OrderStatus,
    /// Return every line's quantity to stock in the same write.
    pub restock: bool,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fails with `Conflict` when a category with the same name (ignoring case) exists.
    async fn insert_category(&self, category: &Category) -> StoreResult<()>;
    async fn category(&self, id: Uuid) -> StoreResult<Option<Category>>;
    async fn list_categories(&self) -> StoreResult<Vec<CategorySummary>>;
    /// Flags the category and every product in it. Returns the number of products touched.
    async fn set_category_deleted(&self, id: Uuid, deleted: bool) -> StoreResult<u64>;

    async fn insert_product(&self, product: &Product) -> StoreResult<()>;
    async fn product(&self, id: Uuid) -> StoreResult<Option<Product>>;
    async fn products_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>>;
    async fn list_products(&self, query: &ProductQuery) -> StoreResult<Page<ProductListing>>;
    async fn update_product(&self, product: &Product) -> StoreResult<()>;
    /// Applies a stock adjustment atomically; removals never drive stock negative.
    async fn adjust_stock(&self, id: Uuid, action: StockAction, quantity: u32, reason: Option<&str>) -> StoreResult<Product>;
    async fn defective_records(&self, product_id: Uuid) -> StoreResult<Vec<DefectiveProduct>>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn insert_coupon(&self, coupon: &Coupon) -> StoreResult<()>;
    async fn coupon(&self, id: Uuid) -> StoreResult<Option<Coupon>>;
    async fn coupon_by_code(&self, code: &CouponCode) -> StoreResult<Option<Coupon>>;
    async fn coupons_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Coupon>>;
    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>>;
    async fn update_coupon(&self, coupon: &Coupon) -> StoreResult<()>;
    async fn delete_coupon(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart_for_user(&self, user_id: Uuid) -> StoreResult<Option<Cart>>;
    /// Upserts the user's single cart.
    async fn save_cart(&self, cart: &Cart) -> StoreResult<()>;
    async fn delete_cart_for_user(&self, user_id: Uuid) -> StoreResult<bool>;
    /// Deletes carts last touched before `cutoff`.
    async fn purge_carts_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Decrements stock for every line (each only if enough remains), bumps the
    /// coupon's usage counter while under its cap, inserts the order and
    /// deletes the cart. Either all of it happens or none of it does.
    async fn place_order(&self, checkout: &Checkout) -> StoreResult<()>;
    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>>;
    async fn list_orders(&self, query: &OrderQuery) -> StoreResult<Page<Order>>;
    /// Every order placed by any of `user_ids`, newest first.
    async fn orders_for_users(&self, user_ids: &[Uuid]) -> StoreResult<Vec<Order>>;
    /// Persists a status change only if the stored status still equals `expected`.
    async fn change_status(&self, change: &StatusChange) -> StoreResult<()>;
}

#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Inserts or replaces; a default address clears the user's other defaults in the same write.
    async fn save_address(&self, address: &Address) -> StoreResult<()>;
    async fn address(&self, id: Uuid) -> StoreResult<Option<Address>>;
    /// Default first, then newest.
    async fn addresses_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Address>>;
    async fn delete_address(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait OfferStore: Send + Sync {
    /// Inserts the offer together with coupons created for it.
    async fn insert_offer(&self, offer: &Offer, coupons: &[Coupon]) -> StoreResult<()>;
    async fn offer(&self, id: Uuid) -> StoreResult<Option<Offer>>;
    async fn list_offers(&self) -> StoreResult<Vec<Offer>>;
    async fn update_offer(&self, offer: &Offer) -> StoreResult<()>;
    async fn delete_offer(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts the user unless one with the same email exists; returns the stored record.
    async fn upsert_by_email(&self, user: &User) -> StoreResult<User>;
    async fn user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> StoreResult<Option<User>>;
    /// Replaces the profile fields and wishlist. Fails with `Conflict` when the
    /// email belongs to another user.
    async fn update_user(&self, user: &User) -> StoreResult<()>;
    /// Newest first.
    async fn list_users(&self, query: &UserQuery) -> StoreResult<Page<User>>;
}

pub trait Store: CatalogStore + CouponStore + CartStore + OrderStore + AddressStore + OfferStore + UserStore {
    fn backend(&self) -> &'static str;
}

pub(crate) fn duplicate_code(code: &CouponCode) -> StoreError {
    StoreError::Conflict(format!("Coupon code {code} already exists."))
}

pub(crate) fn duplicate_email(email: &str) -> StoreError {
    StoreError::Conflict(format!("Email {email} is already in use"))
}

pub(crate) fn duplicate_category(name: &str) -> StoreError {
    StoreError::Conflict(format!("Category {name} already exists"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::product;
    use rust_decimal_macros::dec;

    #[test]
    fn product_query_filters() {
        let mut lamp = product("Desk Lamp", Uuid::now_v7(), dec!(40), 5);
        let q = ProductQuery { search: Some("lamp".into()), stock: Some(StockFilter::LowStock), ..Default::default() };
        assert!(q.matches(&lamp));
        lamp.set_deleted(true);
        assert!(!q.matches(&lamp));
        assert!(ProductQuery { show_deleted: true, ..Default::default() }.matches(&lamp));
    }

    #[test]
    fn user_query_searches_name_and_email() {
        let user = User::register("Asha Rao", "asha@example.com", None).unwrap();
        assert!(UserQuery { search: Some("RAO".into()), ..Default::default() }.matches(&user));
        assert!(UserQuery { search: Some("Example".into()), ..Default::default() }.matches(&user));
        assert!(!UserQuery { search: Some("ravi".into()), ..Default::default() }.matches(&user));
    }

    #[test]
    fn insufficient_stock_lists_every_name() {
        let err = StoreError::InsufficientStock(vec!["Lamp".into(), "Mug".into()]);
        assert_eq!(err.to_string(), "Insufficient stock for: Lamp, Mug");
    }
}

//! Cart mutations. Every mutation loads the cart, changes it in memory (which
//! reprices it) and writes it back whole.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CouponError};
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::value_objects::CouponCode;
use crate::error::{Result, StorefrontError};
use crate::services::Outbox;
use crate::store::Store;

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
    outbox: Outbox,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>, outbox: Outbox) -> Self { Self { store, outbox } }

    pub async fn cart(&self, user_id: Uuid) -> Result<Cart> {
        self.store.cart_for_user(user_id).await?.ok_or_else(|| StorefrontError::not_found("Cart"))
    }

    /// Adds a product at its current price, creating the cart on first use.
    #[instrument(skip(self))]
    pub async fn add_item(&self, user_id: Uuid, product_id: Uuid, quantity: u32) -> Result<Cart> {
        let product = self.store.product(product_id).await?.ok_or_else(|| StorefrontError::not_found("Product"))?;
        let mut cart = self.store.cart_for_user(user_id).await?.unwrap_or_else(|| Cart::new(user_id));
        cart.add_item(&product, quantity)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Returns `None` when the last line went and the cart was deleted.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> Result<Option<Cart>> {
        let mut cart = self.cart(user_id).await?;
        cart.remove_item(product_id)?;
        self.persist(cart).await
    }

    #[instrument(skip(self))]
    pub async fn set_quantity(&self, user_id: Uuid, product_id: Uuid, quantity: u32) -> Result<Option<Cart>> {
        let mut cart = self.cart(user_id).await?;
        cart.update_quantity(product_id, quantity)?;
        self.persist(cart).await
    }

    async fn persist(&self, cart: Cart) -> Result<Option<Cart>> {
        if cart.is_empty() {
            self.store.delete_cart_for_user(cart.user_id()).await?;
            return Ok(None);
        }
        self.store.save_cart(&cart).await?;
        Ok(Some(cart))
    }

    /// Applies a coupon by code. A rejected code leaves the stored cart as it was.
    #[instrument(skip(self, code))]
    pub async fn apply_coupon(&self, user_id: Uuid, code: &str) -> Result<Cart> {
        let code = CouponCode::new(code).map_err(|_| CouponError::InvalidOrExpired)?;
        let mut cart = self.cart(user_id).await?;
        let coupon = self.store.coupon_by_code(&code).await?.ok_or(CouponError::InvalidOrExpired)?;
        let categories = self.categories_in(&cart).await?;
        let discount = cart.apply_coupon(&coupon, &categories, Utc::now())?;
        self.store.save_cart(&cart).await?;

        info!(cart_id = %cart.id(), code = %code, %discount, "coupon applied");
        self.outbox
            .emit(DomainEvent::Cart(CartEvent::CouponApplied { cart_id: cart.id(), user_id, code: code.into_inner(), discount }))
            .await;
        Ok(cart)
    }

    pub async fn remove_coupon(&self, user_id: Uuid) -> Result<Cart> {
        let mut cart = self.cart(user_id).await?;
        if cart.remove_coupon() {
            self.store.save_cart(&cart).await?;
        }
        Ok(cart)
    }

    pub async fn clear(&self, user_id: Uuid) -> Result<()> {
        if !self.store.delete_cart_for_user(user_id).await? { return Err(StorefrontError::not_found("Cart")); }
        Ok(())
    }

    /// Categories of the products currently in the cart.
    pub(crate) async fn categories_in(&self, cart: &Cart) -> Result<BTreeSet<Uuid>> {
        let products = self.store.products_by_ids(&cart.product_ids()).await?;
        Ok(products.into_iter().map(|p| p.category_id).collect())
    }

    /// Deletes carts idle for longer than `ttl`.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self, ttl: Duration) -> Result<u64> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| StorefrontError::Internal(e.to_string()))?;
        let cutoff = Utc::now().checked_sub_signed(ttl).unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let purged = self.store.purge_carts_before(cutoff).await?;
        if purged > 0 {
            info!(purged, "expired carts purged");
            self.outbox.emit(DomainEvent::Cart(CartEvent::Expired { purged })).await;
        }
        Ok(purged)
    }
}

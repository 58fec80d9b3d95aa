//! Coupon administration and the customer-facing "available coupons" list.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{Coupon, CouponPatch, NewCoupon};
use crate::error::{Result, StorefrontError};
use crate::store::Store;

#[derive(Clone)]
pub struct CouponService {
    store: Arc<dyn Store>,
}

impl CouponService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    #[instrument(skip_all, fields(code = %draft.code))]
    pub async fn create(&self, draft: NewCoupon) -> Result<Coupon> {
        let coupon = Coupon::create(draft, Utc::now())?;
        self.store.insert_coupon(&coupon).await?;
        info!(coupon_id = %coupon.id, "coupon created");
        Ok(coupon)
    }

    /// Every coupon, with expired ones flagged inactive on the way out.
    pub async fn list(&self) -> Result<Vec<Coupon>> {
        let now = Utc::now();
        let mut coupons = self.store.list_coupons().await?;
        coupons.iter_mut().for_each(|c| c.refresh_activity(now));
        Ok(coupons)
    }

    pub async fn coupon(&self, id: Uuid) -> Result<Coupon> {
        self.store.coupon(id).await?.ok_or_else(|| StorefrontError::not_found("Coupon"))
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: Uuid, patch: CouponPatch) -> Result<Coupon> {
        let mut coupon = self.coupon(id).await?;
        coupon.apply(patch, Utc::now())?;
        self.store.update_coupon(&coupon).await?;
        Ok(coupon)
    }

    /// Returns the coupon that was removed.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<Coupon> {
        let coupon = self.coupon(id).await?;
        if !self.store.delete_coupon(id).await? { return Err(StorefrontError::not_found("Coupon")); }
        info!(code = %coupon.code, "coupon deleted");
        Ok(coupon)
    }

    /// Redeemable coupons worth showing for the user's cart: unrestricted ones,
    /// plus those allowing at least one category in the cart.
    pub async fn available_for(&self, user_id: Uuid) -> Result<Vec<Coupon>> {
        let categories: BTreeSet<Uuid> = match self.store.cart_for_user(user_id).await? {
            Some(cart) => self.store.products_by_ids(&cart.product_ids()).await?.into_iter().map(|p| p.category_id).collect(),
            None => BTreeSet::new(),
        };
        let now = Utc::now();
        Ok(self
            .store
            .list_coupons()
            .await?
            .into_iter()
            .filter(|c| c.is_redeemable_at(now) && !c.is_exhausted() && c.offered_for(&categories))
            .collect())
    }
}

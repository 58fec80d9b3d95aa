//! Promotional offers and the coupons advertised with them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{Coupon, NewCoupon, Offer, OfferError, OfferPatch};
use crate::domain::value_objects::ImageRef;
use crate::error::{Result, StorefrontError};
use crate::store::Store;

#[derive(Clone, Debug)]
pub struct NewOffer {
    pub title: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Existing coupons to advertise.
    pub coupon_ids: Vec<Uuid>,
    /// Coupons created together with the offer.
    pub coupons: Vec<NewCoupon>,
    pub images: Vec<ImageRef>,
}

#[derive(Clone)]
pub struct OfferService {
    store: Arc<dyn Store>,
}

impl OfferService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    #[instrument(skip_all, fields(title = %draft.title))]
    pub async fn create(&self, draft: NewOffer) -> Result<Offer> {
        let now = Utc::now();
        self.ensure_coupons_exist(&draft.coupon_ids).await?;
        let created = draft.coupons.into_iter().map(|c| Coupon::create(c, now)).collect::<std::result::Result<Vec<_>, _>>()?;

        let mut coupon_ids = draft.coupon_ids;
        coupon_ids.extend(created.iter().map(|c| c.id));
        let offer = Offer::create(&draft.title, &draft.description, draft.start_date, draft.end_date, coupon_ids, draft.images, now)?;
        self.store.insert_offer(&offer, &created).await?;
        info!(offer_id = %offer.id, coupons = created.len(), "offer created");
        Ok(offer)
    }

    async fn ensure_coupons_exist(&self, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() { return Ok(()); }
        let found = self.store.coupons_by_ids(ids).await?;
        if ids.iter().any(|id| !found.iter().any(|c| c.id == *id)) { return Err(OfferError::UnknownCoupons.into()); }
        Ok(())
    }

    /// The running offer that ends soonest; what shoppers see as the banner.
    pub async fn current(&self) -> Result<Option<Offer>> {
        let now = Utc::now();
        Ok(self.store.list_offers().await?.into_iter().filter(|o| o.is_running_at(now)).min_by_key(|o| o.end_date))
    }

    /// Every offer that has not ended yet, soonest-ending first.
    pub async fn open(&self) -> Result<Vec<Offer>> {
        let now = Utc::now();
        let mut offers: Vec<Offer> = self.store.list_offers().await?.into_iter().filter(|o| o.end_date > now).collect();
        offers.sort_by_key(|o| o.end_date);
        Ok(offers)
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: Uuid, patch: OfferPatch) -> Result<Offer> {
        let mut offer = self.store.offer(id).await?.ok_or_else(|| StorefrontError::not_found("Offer"))?;
        if let Some(ids) = &patch.coupon_ids {
            self.ensure_coupons_exist(ids).await?;
        }
        offer.apply(patch, Utc::now())?;
        self.store.update_offer(&offer).await?;
        Ok(offer)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_offer(id).await? { return Err(StorefrontError::not_found("Offer")); }
        info!("offer deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tests::harness;
    use crate::store::CouponStore;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn draft(title: &str, ends_in: Duration) -> NewOffer {
        let now = Utc::now();
        NewOffer {
            title: title.into(), description: "Limited time".into(), start_date: now - Duration::days(1),
            end_date: now + ends_in, coupon_ids: vec![], coupons: vec![], images: vec![],
        }
    }

    #[tokio::test]
    async fn nested_coupons_are_created_with_the_offer() {
        let h = harness();
        let now = Utc::now();
        let nested = NewCoupon {
            code: "fest20".into(), discount: dec!(20), max_limit: 50, min_order_amount: Decimal::ZERO,
            start_date: now, expiry: now + Duration::days(3), applicable_categories: vec![],
        };
        let offer = h.services.offers.create(NewOffer { coupons: vec![nested], ..draft("Festival", Duration::days(3)) }).await.unwrap();
        assert_eq!(offer.coupon_ids.len(), 1);
        assert_eq!(h.store.coupon(offer.coupon_ids[0]).await.unwrap().unwrap().code.as_str(), "FEST20");
    }

    #[tokio::test]
    async fn unknown_coupon_ids_are_rejected() {
        let h = harness();
        let err = h.services.offers
            .create(NewOffer { coupon_ids: vec![Uuid::now_v7()], ..draft("Ghost", Duration::days(1)) })
            .await
            .unwrap_err();
        assert_eq!(err.response_message(), "Some provided coupons are invalid.");
    }

    #[tokio::test]
    async fn current_offer_is_the_soonest_ending() {
        let h = harness();
        h.services.offers.create(draft("Week", Duration::days(7))).await.unwrap();
        let soon = h.services.offers.create(draft("Flash", Duration::hours(2))).await.unwrap();
        assert_eq!(h.services.offers.current().await.unwrap().unwrap().id, soon.id);
        assert_eq!(h.services.offers.open().await.unwrap().len(), 2);

        h.services.offers.delete(soon.id).await.unwrap();
        assert_eq!(h.services.offers.current().await.unwrap().unwrap().title, "Week");
        assert!(h.services.offers.delete(soon.id).await.is_err());
    }

    #[tokio::test]
    async fn update_checks_the_window() {
        let h = harness();
        let offer = h.services.offers.create(draft("Week", Duration::days(7))).await.unwrap();
        let patch = OfferPatch { end_date: Some(offer.start_date - Duration::hours(1)), ..Default::default() };
        let err = h.services.offers.update(offer.id, patch).await.unwrap_err();
        assert_eq!(err.response_message(), "Start date must be before end date.");
    }
}

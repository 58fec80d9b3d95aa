//! Offer Aggregate
//!
//! A promotional banner with a validity window and the coupons it advertises.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::ImageRef;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub coupon_ids: Vec<Uuid>,
    pub images: Vec<ImageRef>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub coupon_ids: Option<Vec<Uuid>>,
    pub images: Option<Vec<ImageRef>>,
}

impl Offer {
    pub fn create(
        title: &str, description: &str, start_date: DateTime<Utc>, end_date: DateTime<Utc>,
        coupon_ids: Vec<Uuid>, images: Vec<ImageRef>, now: DateTime<Utc>,
    ) -> Result<Self, OfferError> {
        let mut offer = Self {
            id: Uuid::now_v7(), title: title.trim().to_string(), description: description.trim().to_string(),
            start_date, end_date, coupon_ids, images, is_active: true, created_at: now, updated_at: now,
        };
        offer.validate(now)?;
        Ok(offer)
    }

    pub fn apply(&mut self, patch: OfferPatch, now: DateTime<Utc>) -> Result<(), OfferError> {
        let mut next = self.clone();
        if let Some(t) = patch.title { next.title = t.trim().to_string(); }
        if let Some(d) = patch.description { next.description = d.trim().to_string(); }
        if let Some(s) = patch.start_date { next.start_date = s; }
        if let Some(e) = patch.end_date { next.end_date = e; }
        if let Some(ids) = patch.coupon_ids { next.coupon_ids = ids; }
        if let Some(images) = patch.images { next.images = images; }
        next.validate(now)?;
        next.updated_at = now;
        *self = next;
        Ok(())
    }

    /// Runs on every save: checks the window and re-derives `is_active`.
    fn validate(&mut self, now: DateTime<Utc>) -> Result<(), OfferError> {
        if self.title.is_empty() || self.description.is_empty() { return Err(OfferError::MissingFields); }
        if self.start_date >= self.end_date { return Err(OfferError::StartAfterEnd); }
        self.is_active = now < self.end_date;
        Ok(())
    }

    pub fn is_running_at(&self, now: DateTime<Utc>) -> bool { self.is_active && now < self.end_date }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OfferError {
    #[error("All fields (title, description, startDate, endDate) are required.")]
    MissingFields,
    #[error("Start date must be before end date.")]
    StartAfterEnd,
    #[error("Some provided coupons are invalid.")]
    UnknownCoupons,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn activity_follows_end_date() {
        let now = Utc::now();
        let mut offer = Offer::create("Diwali", "Festive deals", now - Duration::days(2), now + Duration::days(1), vec![], vec![], now).unwrap();
        assert!(offer.is_active);
        offer.apply(OfferPatch { end_date: Some(now - Duration::hours(1)), ..Default::default() }, now).unwrap();
        assert!(!offer.is_active);
        assert!(!offer.is_running_at(now));
    }

    #[test]
    fn rejects_inverted_window() {
        let now = Utc::now();
        let err = Offer::create("Sale", "d", now, now, vec![], vec![], now).unwrap_err();
        assert_eq!(err, OfferError::StartAfterEnd);
        assert_eq!(Offer::create(" ", "d", now, now + Duration::days(1), vec![], vec![], now), Err(OfferError::MissingFields));
    }
}

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::coupon::CouponRequest;
use crate::api::{ApiResponse, ApiResult, AppState, JsonBody, PathId, QueryParams, ValidJson};
use crate::auth::AdminSession;
use crate::domain::aggregates::{Offer, OfferPatch};
use crate::domain::value_objects::ImageRef;
use crate::error::Result;
use crate::services::offer::NewOffer;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/offer", get(list_offers).post(create_offer))
        .route("/offer/:id", put(update_offer).delete(delete_offer))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOfferRequest {
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub coupon_ids: Vec<Uuid>,
    #[serde(default)]
    #[validate]
    pub coupons: Vec<CouponRequest>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

impl From<CreateOfferRequest> for NewOffer {
    fn from(r: CreateOfferRequest) -> Self {
        NewOffer {
            title: r.title, description: r.description, start_date: r.start_date, end_date: r.end_date,
            coupon_ids: r.coupon_ids, coupons: r.coupons.into_iter().map(Into::into).collect(), images: r.images,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferParams {
    pub asked_by: Option<String>,
}

async fn create_offer(_: AdminSession, State(s): State<AppState>, ValidJson(r): ValidJson<CreateOfferRequest>) -> ApiResult<Offer> {
    Ok(ApiResponse::created("Offer created successfully", s.services.offers.create(r.into()).await?))
}

/// Shoppers (`askedBy=user`) get the current banner offer; everyone else gets every open offer.
async fn list_offers(State(s): State<AppState>, QueryParams(p): QueryParams<OfferParams>) -> Result<Response> {
    if p.asked_by.as_deref() == Some("user") {
        let current = s.services.offers.current().await?;
        return Ok(ApiResponse::ok("Offer fetched successfully", current).into_response());
    }
    Ok(ApiResponse::ok("Offers fetched successfully", s.services.offers.open().await?).into_response())
}

async fn update_offer(_: AdminSession, State(s): State<AppState>, PathId(id): PathId, JsonBody(patch): JsonBody<OfferPatch>) -> ApiResult<Offer> {
    Ok(ApiResponse::ok("Offer updated successfully", s.services.offers.update(id, patch).await?))
}

async fn delete_offer(_: AdminSession, State(s): State<AppState>, PathId(id): PathId) -> ApiResult<()> {
    s.services.offers.delete(id).await?;
    Ok(ApiResponse::ok("Offer deleted successfully", ()))
}

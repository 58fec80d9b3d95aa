use axum::{extract::State, routing::get, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::{ApiResponse, ApiResult, AppState, JsonBody, PathId, ValidJson};
use crate::auth::{AdminSession, UserSession};
use crate::domain::aggregates::{Coupon, CouponPatch, NewCoupon};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/coupon", get(list_coupons).post(create_coupon))
        .route("/coupon/available", get(available_coupons))
        .route("/coupon/:id", get(get_coupon).patch(update_coupon).delete(delete_coupon))
}

/// Coupon fields as posted by the admin; also nested inside offer requests.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CouponRequest {
    #[validate(length(min = 1))]
    pub code: String,
    pub discount: Decimal,
    #[validate(range(min = 1))]
    pub max_limit: u32,
    #[serde(default)]
    pub min_order_amount: Decimal,
    pub start_date: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    #[serde(default)]
    pub applicable_categories: Vec<Uuid>,
}

impl From<CouponRequest> for NewCoupon {
    fn from(r: CouponRequest) -> Self {
        NewCoupon {
            code: r.code, discount: r.discount, max_limit: r.max_limit, min_order_amount: r.min_order_amount,
            start_date: r.start_date, expiry: r.expiry, applicable_categories: r.applicable_categories,
        }
    }
}

async fn create_coupon(_: AdminSession, State(s): State<AppState>, ValidJson(r): ValidJson<CouponRequest>) -> ApiResult<Coupon> {
    Ok(ApiResponse::created("Coupon created successfully", s.services.coupons.create(r.into()).await?))
}

async fn list_coupons(_: AdminSession, State(s): State<AppState>) -> ApiResult<Vec<Coupon>> {
    let coupons = s.services.coupons.list().await?;
    let message = if coupons.is_empty() { "No coupons found" } else { "Coupons fetched successfully" };
    Ok(ApiResponse::ok(message, coupons))
}

async fn available_coupons(UserSession(user): UserSession, State(s): State<AppState>) -> ApiResult<Vec<Coupon>> {
    Ok(ApiResponse::ok("Available coupons fetched successfully", s.services.coupons.available_for(user.id).await?))
}

async fn get_coupon(_: AdminSession, State(s): State<AppState>, PathId(id): PathId) -> ApiResult<Coupon> {
    Ok(ApiResponse::ok("Coupon fetched successfully", s.services.coupons.coupon(id).await?))
}

async fn update_coupon(_: AdminSession, State(s): State<AppState>, PathId(id): PathId, JsonBody(patch): JsonBody<CouponPatch>) -> ApiResult<Coupon> {
    Ok(ApiResponse::ok("Coupon updated successfully", s.services.coupons.update(id, patch).await?))
}

async fn delete_coupon(_: AdminSession, State(s): State<AppState>, PathId(id): PathId) -> ApiResult<Coupon> {
    Ok(ApiResponse::ok("Coupon deleted successfully", s.services.coupons.delete(id).await?))
}

use axum::{extract::State, routing::{delete, get, patch}, Router};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::{ApiResponse, ApiResult, AppState, PathId, ValidJson};
use crate::auth::UserSession;
use crate::domain::aggregates::Cart;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart).post(add_item).put(apply_coupon).patch(remove_item).delete(clear_cart))
        .route("/cart/items/:product_id", patch(set_quantity))
        .route("/cart/coupon", delete(remove_coupon))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product: Uuid,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RemoveItemRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuantityRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CouponRequest {
    #[validate(length(min = 1))]
    pub code: String,
}

async fn get_cart(UserSession(user): UserSession, State(s): State<AppState>) -> ApiResult<Cart> {
    Ok(ApiResponse::ok("Cart fetched successfully", s.services.carts.cart(user.id).await?))
}

async fn add_item(UserSession(user): UserSession, State(s): State<AppState>, ValidJson(r): ValidJson<AddItemRequest>) -> ApiResult<Cart> {
    Ok(ApiResponse::ok("Item added to cart", s.services.carts.add_item(user.id, r.product, r.quantity).await?))
}

async fn remove_item(UserSession(user): UserSession, State(s): State<AppState>, ValidJson(r): ValidJson<RemoveItemRequest>) -> ApiResult<Option<Cart>> {
    let cart = s.services.carts.remove_item(user.id, r.product_id).await?;
    let message = if cart.is_some() { "Item removed from cart" } else { "Item removed; cart is now empty" };
    Ok(ApiResponse::ok(message, cart))
}

async fn set_quantity(
    UserSession(user): UserSession,
    State(s): State<AppState>,
    PathId(product_id): PathId,
    ValidJson(r): ValidJson<QuantityRequest>,
) -> ApiResult<Option<Cart>> {
    let cart = s.services.carts.set_quantity(user.id, product_id, r.quantity).await?;
    let message = if cart.is_some() { "Cart updated" } else { "Item removed; cart is now empty" };
    Ok(ApiResponse::ok(message, cart))
}

async fn apply_coupon(UserSession(user): UserSession, State(s): State<AppState>, ValidJson(r): ValidJson<CouponRequest>) -> ApiResult<Cart> {
    Ok(ApiResponse::ok("Coupon applied successfully", s.services.carts.apply_coupon(user.id, &r.code).await?))
}

async fn remove_coupon(UserSession(user): UserSession, State(s): State<AppState>) -> ApiResult<Cart> {
    Ok(ApiResponse::ok("Coupon removed", s.services.carts.remove_coupon(user.id).await?))
}

async fn clear_cart(UserSession(user): UserSession, State(s): State<AppState>) -> ApiResult<()> {
    s.services.carts.clear(user.id).await?;
    Ok(ApiResponse::ok("Cart cleared", ()))
}

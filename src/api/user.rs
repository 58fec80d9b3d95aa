use axum::{
    extract::State,
    http::header,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::api::{ApiResponse, ApiResult, AppState, JsonBody, PageParams, PathId, QueryParams};
use crate::auth::{expired_cookie, UserSession, USER_COOKIE};
use crate::domain::aggregates::{Product, ProfilePatch, User};
use crate::services::accounts::Profile;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
        .route("/user/profile", get(profile).patch(update_profile))
        .route("/user/wishlist", get(wishlist))
        .route("/user/wishlist/:id", put(toggle_wishlist))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistPage {
    pub products: Vec<Product>,
    pub total_wishlist_items: u64,
    pub total_pages: u64,
    pub current_page: u32,
}

async fn me(UserSession(user): UserSession) -> ApiResult<User> { Ok(ApiResponse::ok("User fetched successfully", user)) }

async fn logout() -> impl IntoResponse {
    (AppendHeaders([(header::SET_COOKIE, expired_cookie(USER_COOKIE))]), ApiResponse::ok("Logged out successfully", ()))
}

async fn profile(UserSession(user): UserSession, State(s): State<AppState>) -> ApiResult<Profile> {
    Ok(ApiResponse::ok("User profile fetched successfully.", s.services.accounts.profile(user.id).await?))
}

async fn update_profile(UserSession(user): UserSession, State(s): State<AppState>, JsonBody(patch): JsonBody<ProfilePatch>) -> ApiResult<User> {
    Ok(ApiResponse::ok("Profile updated successfully.", s.services.accounts.update_profile(user.id, patch).await?))
}

async fn toggle_wishlist(UserSession(user): UserSession, State(s): State<AppState>, PathId(product_id): PathId) -> ApiResult<Vec<Uuid>> {
    let toggled = s.services.accounts.toggle_wishlist(user.id, product_id).await?;
    let message = if toggled.added { "Added to wishlist" } else { "Removed from wishlist" };
    Ok(ApiResponse::ok(message, toggled.wishlist))
}

async fn wishlist(UserSession(user): UserSession, State(s): State<AppState>, QueryParams(params): QueryParams<PageParams>) -> ApiResult<WishlistPage> {
    let page = params.request();
    let found = s.services.accounts.wishlist(user.id, page).await?;
    Ok(ApiResponse::ok("Wishlist products retrieved successfully", WishlistPage {
        products: found.items,
        total_wishlist_items: found.total,
        total_pages: page.total_pages(found.total),
        current_page: page.page,
    }))
}

//! Admin sign-in, order status changes and the customer views.

use axum::{
    extract::State,
    http::header,
    response::{AppendHeaders, IntoResponse},
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::{ApiResponse, ApiResult, AppState, PathId, QueryParams, ValidJson};
use crate::auth::{expired_cookie, session_cookie, AdminSession, ADMIN_COOKIE};
use crate::domain::aggregates::{Order, OrderStatus, User, UserStatus};
use crate::domain::value_objects::PageRequest;
use crate::error::Result;
use crate::services::accounts::CustomerRecord;
use crate::store::UserQuery;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/login", post(login))
        .route("/admin/logout", post(logout))
        .route("/admin/order/:id", patch(update_order_status))
        .route("/admin/users", get(list_users))
        .route("/admin/user/:id", get(get_user).patch(update_user_status))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub pass: String,
}

#[derive(Debug, Serialize)]
pub struct Token {
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusRequest {
    #[validate(length(min = 1))]
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserFilters {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    pub users: Vec<CustomerRecord>,
    pub total_users: u64,
    pub page: u32,
    pub limit: u32,
}

async fn login(State(s): State<AppState>, ValidJson(r): ValidJson<LoginRequest>) -> Result<impl IntoResponse> {
    let token = s.services.accounts.admin_login(&r.pass)?;
    let cookie = session_cookie(ADMIN_COOKIE, &token, s.keys.admin_ttl());
    Ok((AppendHeaders([(header::SET_COOKIE, cookie)]), ApiResponse::ok("Admin logged in successfully", Token { token })))
}

async fn logout() -> impl IntoResponse {
    (AppendHeaders([(header::SET_COOKIE, expired_cookie(ADMIN_COOKIE))]), ApiResponse::ok("Admin logged out successfully", ()))
}

async fn update_order_status(_: AdminSession, State(s): State<AppState>, PathId(id): PathId, ValidJson(r): ValidJson<StatusRequest>) -> ApiResult<Order> {
    let next: OrderStatus = r.status.trim().parse()?;
    let update = s.services.orders.change_status(id, next).await?;
    let message = if update.notified {
        "Order status updated successfully"
    } else {
        "Order status updated successfully, but email not sent"
    };
    Ok(ApiResponse::ok(message, update.order))
}

async fn update_user_status(_: AdminSession, State(s): State<AppState>, PathId(id): PathId, ValidJson(r): ValidJson<StatusRequest>) -> ApiResult<User> {
    let status: UserStatus = r.status.trim().parse()?;
    Ok(ApiResponse::ok("User status updated successfully", s.services.accounts.set_user_status(id, status).await?))
}

async fn list_users(_: AdminSession, State(s): State<AppState>, QueryParams(f): QueryParams<UserFilters>) -> ApiResult<UserPage> {
    let page = PageRequest::new(f.page, f.limit, 10);
    let search = f.search.map(|q| q.trim().to_string()).filter(|q| !q.is_empty());
    let found = s.services.accounts.customers(&UserQuery { search, page }).await?;
    Ok(ApiResponse::ok("Users fetched successfully", UserPage {
        users: found.items, total_users: found.total, page: page.page, limit: page.limit,
    }))
}

async fn get_user(_: AdminSession, State(s): State<AppState>, PathId(id): PathId) -> ApiResult<CustomerRecord> {
    Ok(ApiResponse::ok("User details fetched successfully", s.services.accounts.customer(id).await?))
}

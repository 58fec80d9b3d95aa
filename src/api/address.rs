use axum::{extract::State, routing::get, Router};

use crate::api::{ApiResponse, ApiResult, AppState, JsonBody, PathId};
use crate::auth::{AnySession, UserSession};
use crate::domain::aggregates::{Address, AddressPatch, NewAddress};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/address", get(list_addresses).post(create_address))
        .route("/address/:id", get(get_address).put(update_address).delete(delete_address))
}

async fn create_address(UserSession(user): UserSession, State(s): State<AppState>, JsonBody(draft): JsonBody<NewAddress>) -> ApiResult<Address> {
    Ok(ApiResponse::created("Address added successfully", s.services.addresses.create(user.id, draft).await?))
}

async fn list_addresses(UserSession(user): UserSession, State(s): State<AppState>) -> ApiResult<Vec<Address>> {
    Ok(ApiResponse::ok("Addresses fetched successfully", s.services.addresses.list(user.id).await?))
}

async fn get_address(session: AnySession, State(s): State<AppState>, PathId(id): PathId) -> ApiResult<Address> {
    Ok(ApiResponse::ok("Address fetched successfully", s.services.addresses.address(id, session.user_id()).await?))
}

async fn update_address(
    UserSession(user): UserSession,
    State(s): State<AppState>,
    PathId(id): PathId,
    JsonBody(patch): JsonBody<AddressPatch>,
) -> ApiResult<Address> {
    Ok(ApiResponse::ok("Address updated successfully", s.services.addresses.update(user.id, id, patch).await?))
}

async fn delete_address(UserSession(user): UserSession, State(s): State<AppState>, PathId(id): PathId) -> ApiResult<()> {
    s.services.addresses.delete(user.id, id).await?;
    Ok(ApiResponse::ok("Address deleted successfully", ()))
}

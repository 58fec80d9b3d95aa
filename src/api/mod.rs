//! HTTP surface.
//!
//! Every route sits under `/api/v1`. Handlers parse the request, call one
//! service method and wrap the result in the success envelope; failures render
//! through [`StorefrontError`]'s `IntoResponse`.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use validator::Validate;

use crate::auth::SessionKeys;
use crate::domain::value_objects::PageRequest;
use crate::error::StorefrontError;
use crate::services::Services;

pub mod address;
pub mod admin;
pub mod cart;
pub mod category;
pub mod coupon;
pub mod offer;
pub mod order;
pub mod product;
pub mod user;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub keys: SessionKeys,
    /// Name of the active store backend, reported by `/health`.
    pub backend: &'static str,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(product::routes())
        .merge(category::routes())
        .merge(coupon::routes())
        .merge(cart::routes())
        .merge(order::routes())
        .merge(address::routes())
        .merge(offer::routes())
        .merge(admin::routes())
        .merge(user::routes());

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(s): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "storefront", "store": s.backend }))
}

/// Success envelope: `{ statusCode, success: true, message, data }`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    status_code: u16,
    success: bool,
    message: String,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self { Self::with_status(StatusCode::OK, message, data) }

    pub fn created(message: impl Into<String>, data: T) -> Self { Self::with_status(StatusCode::CREATED, message, data) }

    fn with_status(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self { status_code: status.as_u16(), success: true, message: message.into(), data }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, StorefrontError>;

/// JSON body that must also pass its `validator` rules.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = StorefrontError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let JsonBody(value) = JsonBody::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// `Json` whose rejections use the error envelope.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = StorefrontError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| StorefrontError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

/// `Query` whose rejections use the error envelope.
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = StorefrontError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await.map_err(|e| StorefrontError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

/// The single `:id` path segment of a route.
pub struct PathId(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for PathId {
    type Rejection = StorefrontError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map_err(|_| StorefrontError::BadRequest("Invalid id".into()))?;
        Ok(Self(id))
    }
}

/// `page` / `limit` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageParams {
    pub fn request(&self) -> PageRequest { PageRequest::new(self.page, self.limit, 10) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::created("Created", vec![1, 2])).unwrap();
        assert_eq!(body, serde_json::json!({ "statusCode": 201, "success": true, "message": "Created", "data": [1, 2] }));
    }

    #[test]
    fn page_params_are_clamped() {
        let req = PageParams { page: Some(0), limit: Some(500) }.request();
        assert_eq!((req.page, req.limit), (1, PageRequest::MAX_LIMIT));
        assert_eq!(PageParams::default().request().limit, 10);
    }
}

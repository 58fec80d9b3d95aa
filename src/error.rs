use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::domain::aggregates::{
    AddressError, CartError, CategoryError, CouponError, OfferError, OrderError, ProductError, UserError,
};
use crate::domain::value_objects::CouponCodeError;
use crate::store::StoreError;

/// Every failure a request can end in.
#[derive(Debug, thiserror::Error)]
pub enum StorefrontError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error(transparent)]
    Category(#[from] CategoryError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Offer(#[from] OfferError),

    #[error(transparent)]
    User(#[from] UserError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StorefrontError>;

impl From<validator::ValidationErrors> for StorefrontError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut fields: Vec<&str> = err.field_errors().into_keys().collect();
        fields.sort_unstable();
        StorefrontError::Validation(format!("invalid or missing fields: {}", fields.join(", ")))
    }
}

impl From<CouponCodeError> for StorefrontError {
    fn from(err: CouponCodeError) -> Self { StorefrontError::Coupon(CouponError::InvalidCode(err)) }
}

impl From<jsonwebtoken::errors::Error> for StorefrontError {
    fn from(_: jsonwebtoken::errors::Error) -> Self { StorefrontError::Unauthorized("Invalid or expired session".into()) }
}

impl StorefrontError {
    pub fn not_found(what: &str) -> Self { StorefrontError::NotFound(format!("{what} not found")) }

    /// The single error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_)
            | Self::Validation(_)
            | Self::Cart(_)
            | Self::Order(_)
            | Self::Product(_)
            | Self::Coupon(_)
            | Self::Category(_)
            | Self::Address(_)
            | Self::Offer(_)
            | Self::User(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(e) => match e {
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::Conflict(_) | StoreError::StaleStatus { .. } => StatusCode::CONFLICT,
                StoreError::InsufficientStock(_) | StoreError::CouponExhausted(_) => StatusCode::BAD_REQUEST,
                StoreError::Database(_) | StoreError::Migration(_) | StoreError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to the client; internal failures stay generic.
    pub fn response_message(&self) -> String {
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope {
    status_code: u16,
    success: bool,
    message: String,
}

impl IntoResponse for StorefrontError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        let body = ErrorEnvelope { status_code: status.as_u16(), success: false, message: self.response_message() };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_are_bad_requests() {
        let err = StorefrontError::from(CouponError::NotApplicableToAllItems);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.response_message(), "This coupon is not applicable to all items in your cart");
    }

    #[test]
    fn store_errors_map_by_kind() {
        let short = StorefrontError::from(StoreError::InsufficientStock(vec!["Lamp".into(), "Mug".into()]));
        assert_eq!(short.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(short.response_message(), "Insufficient stock for: Lamp, Mug");
        let corrupt = StorefrontError::from(StoreError::Corrupt("bad json".into()));
        assert_eq!(corrupt.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(corrupt.response_message(), "Internal server error");
    }
}

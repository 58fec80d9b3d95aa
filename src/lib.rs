//! Storefront backend
//!
//! REST API for an online shop.
//!
//! ## Features
//! - Product catalog with categories, soft delete and stock adjustments
//! - Cart pricing (shipping threshold, GST) and percentage coupons
//! - Atomic cart-to-order checkout and order status workflow
//! - Customer addresses and promotional offers
//! - Admin and customer sessions (signed JWT)
//! - Postgres or in-memory storage, NATS events and email notifications

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod messaging;
pub mod services;
pub mod store;

pub use error::{Result, StorefrontError};

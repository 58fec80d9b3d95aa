//! Storefront domain: aggregates, value objects, the pricing engine and events.
pub mod aggregates;
pub mod events;
pub mod pricing;
pub mod value_objects;

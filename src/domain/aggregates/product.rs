//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{round_money, ImageRef, Percentage};

/// Products with fewer units than this count as low stock.
pub const LOW_STOCK_THRESHOLD: u32 = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub cost: Decimal,
    pub price: Decimal,
    pub discount_percentage: Percentage,
    pub discounted_price: Decimal,
    pub stock: u32,
    pub total_quantity: u32,
    pub defected: u32,
    pub images: Vec<ImageRef>,
    pub category_id: Uuid,
    pub is_featured: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to stock a new product.
#[derive(Clone, Debug)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub cost: Decimal,
    pub price: Decimal,
    pub discount_percentage: Decimal,
    pub total_quantity: u32,
    pub category_id: Uuid,
    pub is_featured: bool,
    pub images: Vec<ImageRef>,
}

/// Partial update of a product's descriptive and pricing fields.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cost: Option<Decimal>,
    pub price: Option<Decimal>,
    pub discount_percentage: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub is_featured: Option<bool>,
    pub images: Option<Vec<ImageRef>>,
}

/// Listing filter over stock levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StockFilter { InStock, OutOfStock, LowStock }

impl StockFilter {
    pub fn matches(&self, stock: u32) -> bool {
        match self {
            Self::InStock => stock > 0,
            Self::OutOfStock => stock == 0,
            Self::LowStock => stock < LOW_STOCK_THRESHOLD,
        }
    }
}

/// Manual stock adjustment performed by an admin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockAction {
    /// New units received; grows both stock and total quantity.
    Add,
    /// Units withdrawn from sale.
    Remove,
    /// Units found defective; withdrawn and logged.
    Defective,
}

impl StockAction {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Add => "add", Self::Remove => "remove", Self::Defective => "defective" }
    }
}

/// Log entry for units withdrawn as defective.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefectiveProduct {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn create(draft: NewProduct) -> Result<Self, ProductError> {
        let name = draft.name.trim().to_string();
        if name.is_empty() { return Err(ProductError::MissingName); }
        if draft.description.trim().is_empty() { return Err(ProductError::MissingDescription); }
        if draft.total_quantity == 0 { return Err(ProductError::InvalidQuantity); }
        validate_amount("price", draft.price, false)?;
        validate_amount("cost", draft.cost, true)?;
        let discount_percentage = Percentage::new(draft.discount_percentage)
            .map_err(|_| ProductError::InvalidDiscount(draft.discount_percentage))?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), name, description: draft.description, cost: draft.cost, price: draft.price,
            discount_percentage, discounted_price: discounted_price(draft.price, discount_percentage),
            stock: draft.total_quantity, total_quantity: draft.total_quantity, defected: 0,
            images: draft.images, category_id: draft.category_id, is_featured: draft.is_featured,
            is_deleted: false, created_at: now, updated_at: now,
        })
    }

    pub fn is_available(&self) -> bool { !self.is_deleted }
    pub fn image_urls(&self) -> Vec<String> { self.images.iter().map(|i| i.url.clone()).collect() }

    /// Applies a partial update; the discounted price is re-derived whenever
    /// price or discount change.
    pub fn apply(&mut self, patch: ProductPatch) -> Result<(), ProductError> {
        if let Some(name) = patch.name {
            let name = name.trim().to_string();
            if name.is_empty() { return Err(ProductError::MissingName); }
            self.name = name;
        }
        if let Some(description) = patch.description {
            if description.trim().is_empty() { return Err(ProductError::MissingDescription); }
            self.description = description;
        }
        if let Some(cost) = patch.cost { validate_amount("cost", cost, true)?; self.cost = cost; }
        if let Some(price) = patch.price { validate_amount("price", price, false)?; self.price = price; }
        if let Some(pct) = patch.discount_percentage {
            self.discount_percentage = Percentage::new(pct).map_err(|_| ProductError::InvalidDiscount(pct))?;
        }
        if let Some(category_id) = patch.category_id { self.category_id = category_id; }
        if let Some(featured) = patch.is_featured { self.is_featured = featured; }
        if let Some(images) = patch.images { self.images = images; }
        self.discounted_price = discounted_price(self.price, self.discount_percentage);
        self.touch();
        Ok(())
    }

    /// Takes `qty` units out of stock, failing without change when short.
    pub fn reserve(&mut self, qty: u32) -> Result<(), ProductError> {
        if qty > self.stock {
            return Err(ProductError::InsufficientStock { name: self.name.clone(), available: self.stock, requested: qty });
        }
        self.stock -= qty;
        self.touch();
        Ok(())
    }

    /// Returns `qty` units to stock, capped at the quantity ever stocked.
    pub fn restock(&mut self, qty: u32) {
        self.stock = self.stock.saturating_add(qty).min(self.total_quantity);
        self.touch();
    }

    pub fn adjust_stock(&mut self, action: StockAction, qty: u32) -> Result<(), ProductError> {
        if qty == 0 { return Err(ProductError::InvalidQuantity); }
        match action {
            StockAction::Add => {
                self.stock = self.stock.saturating_add(qty);
                self.total_quantity = self.total_quantity.saturating_add(qty);
                self.touch();
            }
            StockAction::Remove => self.reserve(qty)?,
            StockAction::Defective => {
                self.reserve(qty)?;
                self.defected = self.defected.saturating_add(qty);
            }
        }
        Ok(())
    }

    pub fn set_deleted(&mut self, deleted: bool) { self.is_deleted = deleted; self.touch(); }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// `price × (1 − pct/100)` rounded to currency precision.
pub fn discounted_price(price: Decimal, pct: Percentage) -> Decimal { round_money(price - pct.of(price)) }

fn validate_amount(field: &'static str, value: Decimal, allow_zero: bool) -> Result<(), ProductError> {
    if value < Decimal::ZERO || (!allow_zero && value.is_zero()) {
        return Err(ProductError::InvalidAmount { field, value });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("Product name is required")]
    MissingName,
    #[error("Product description is required")]
    MissingDescription,
    #[error("Quantity must be greater than zero")]
    InvalidQuantity,
    #[error("Invalid {field}: {value}")]
    InvalidAmount { field: &'static str, value: Decimal },
    #[error("Discount percentage must be between 0 and 100, got {0}")]
    InvalidDiscount(Decimal),
    #[error("Insufficient stock for {name}: {available} available, {requested} requested")]
    InsufficientStock { name: String, available: u32, requested: u32 },
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) fn product(name: &str, category_id: Uuid, price: Decimal, qty: u32) -> Product {
        Product::create(NewProduct {
            name: name.into(), description: format!("{name} description"), cost: price / dec!(2), price,
            discount_percentage: Decimal::ZERO, total_quantity: qty, category_id, is_featured: false,
            images: vec![ImageRef { url: format!("https://media.example/{name}.jpg"), public_id: name.into() }],
        })
        .unwrap()
    }

    #[test]
    fn create_derives_discounted_price_and_stock() {
        let mut draft_product = product("Lamp", Uuid::now_v7(), dec!(250), 12);
        assert_eq!(draft_product.stock, 12);
        assert_eq!(draft_product.discounted_price, dec!(250));
        draft_product.apply(ProductPatch { discount_percentage: Some(dec!(12.5)), ..Default::default() }).unwrap();
        assert_eq!(draft_product.discounted_price, dec!(218.75));
        draft_product.apply(ProductPatch { price: Some(dec!(99.99)), ..Default::default() }).unwrap();
        assert_eq!(draft_product.discounted_price, dec!(87.49));
    }

    #[test]
    fn rejects_bad_discount() {
        let mut p = product("Lamp", Uuid::now_v7(), dec!(250), 1);
        let err = p.apply(ProductPatch { discount_percentage: Some(dec!(120)), ..Default::default() }).unwrap_err();
        assert_eq!(err, ProductError::InvalidDiscount(dec!(120)));
        assert_eq!(p.discount_percentage, Percentage::ZERO);
    }

    #[test]
    fn stock_adjustments() {
        let mut p = product("Mug", Uuid::now_v7(), dec!(10), 5);
        p.adjust_stock(StockAction::Add, 5).unwrap();
        assert_eq!((p.stock, p.total_quantity), (10, 10));
        p.adjust_stock(StockAction::Defective, 2).unwrap();
        assert_eq!((p.stock, p.defected), (8, 2));
        assert!(matches!(p.adjust_stock(StockAction::Remove, 9), Err(ProductError::InsufficientStock { .. })));
        assert_eq!(p.stock, 8);
        p.restock(100);
        assert_eq!(p.stock, p.total_quantity);
    }

    #[test]
    fn stock_filters() {
        assert!(StockFilter::LowStock.matches(0));
        assert!(StockFilter::LowStock.matches(9));
        assert!(!StockFilter::LowStock.matches(10));
        assert!(StockFilter::OutOfStock.matches(0));
        assert!(!StockFilter::InStock.matches(0));
    }
}

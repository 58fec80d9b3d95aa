//! Products, categories and stock.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{
    Category, CategorySummary, DefectiveProduct, NewProduct, Product, ProductPatch, StockAction,
};
use crate::domain::events::{CatalogEvent, DomainEvent};
use crate::domain::value_objects::{ImageRef, Page, PageRequest};
use crate::error::{Result, StorefrontError};
use crate::services::Outbox;
use crate::store::{ProductListing, ProductQuery, Store};

/// Outcome of a batch product upload; one bad entry never sinks the rest.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpload {
    pub successful_uploads: Vec<Product>,
    pub failed_uploads: Vec<FailedUpload>,
}

#[derive(Debug, Serialize)]
pub struct FailedUpload {
    pub name: String,
    pub reason: String,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    outbox: Outbox,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, outbox: Outbox) -> Self { Self { store, outbox } }

    #[instrument(skip_all, fields(count = drafts.len()))]
    pub async fn create_products(&self, drafts: Vec<NewProduct>) -> Result<BatchUpload> {
        if drafts.is_empty() { return Err(StorefrontError::BadRequest("Provide an array of products".into())); }
        let results = join_all(drafts.into_iter().map(|draft| async move {
            let name = draft.name.clone();
            self.create_product(draft).await.map_err(|e| FailedUpload { name, reason: e.response_message() })
        }))
        .await;

        let mut batch = BatchUpload::default();
        for result in results {
            match result {
                Ok(product) => batch.successful_uploads.push(product),
                Err(failed) => batch.failed_uploads.push(failed),
            }
        }
        info!(created = batch.successful_uploads.len(), failed = batch.failed_uploads.len(), "batch product upload");
        Ok(batch)
    }

    async fn create_product(&self, draft: NewProduct) -> Result<Product> {
        self.live_category(draft.category_id).await?;
        let product = Product::create(draft)?;
        self.store.insert_product(&product).await?;
        Ok(product)
    }

    /// A category that exists and is not soft-deleted.
    async fn live_category(&self, id: Uuid) -> Result<Category> {
        match self.store.category(id).await? {
            Some(c) if !c.is_deleted => Ok(c),
            Some(c) => Err(StorefrontError::BadRequest(format!("Category {} is deleted", c.name))),
            None => Err(StorefrontError::not_found("Category")),
        }
    }

    pub async fn list_products(&self, query: &ProductQuery) -> Result<Page<ProductListing>> {
        Ok(self.store.list_products(query).await?)
    }

    pub async fn products_in_category(&self, category_id: Uuid, page: PageRequest) -> Result<Page<ProductListing>> {
        let query = ProductQuery { category_id: Some(category_id), page, ..Default::default() };
        Ok(self.store.list_products(&query).await?)
    }

    pub async fn product(&self, id: Uuid) -> Result<Product> {
        self.store.product(id).await?.ok_or_else(|| StorefrontError::not_found("Product"))
    }

    #[instrument(skip(self, patch))]
    pub async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Product> {
        let mut product = self.product(id).await?;
        if let Some(category_id) = patch.category_id.filter(|c| *c != product.category_id) {
            self.live_category(category_id).await?;
        }
        product.apply(patch)?;
        self.store.update_product(&product).await?;
        Ok(product)
    }

    /// Soft delete (`true`) or restore (`false`).
    #[instrument(skip(self))]
    pub async fn set_product_deleted(&self, id: Uuid, deleted: bool) -> Result<Product> {
        let mut product = self.product(id).await?;
        if !deleted {
            self.live_category(product.category_id).await?;
        }
        product.set_deleted(deleted);
        self.store.update_product(&product).await?;
        info!(deleted, "product visibility changed");
        Ok(product)
    }

    #[instrument(skip(self, reason))]
    pub async fn adjust_stock(&self, id: Uuid, action: StockAction, quantity: u32, reason: Option<String>) -> Result<Product> {
        if quantity == 0 { return Err(StorefrontError::BadRequest("Valid action and quantity are required".into())); }
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        if action == StockAction::Defective && reason.is_none() {
            return Err(StorefrontError::BadRequest("A reason is required when marking stock defective".into()));
        }
        let product = self.store.adjust_stock(id, action, quantity, reason.as_deref()).await?;
        info!(action = action.as_str(), quantity, stock = product.stock, "stock adjusted");
        self.outbox
            .emit(DomainEvent::Catalog(CatalogEvent::StockAdjusted { product_id: id, action, quantity, stock: product.stock }))
            .await;
        Ok(product)
    }

    pub async fn defective_records(&self, id: Uuid) -> Result<Vec<DefectiveProduct>> {
        self.product(id).await?;
        Ok(self.store.defective_records(id).await?)
    }

    #[instrument(skip(self, description, image))]
    pub async fn create_category(&self, name: &str, description: Option<String>, image: Option<ImageRef>) -> Result<Category> {
        let category = Category::create(name, description, image)?;
        self.store.insert_category(&category).await?;
        info!(category_id = %category.id, "category created");
        Ok(category)
    }

    pub async fn categories(&self) -> Result<Vec<CategorySummary>> { Ok(self.store.list_categories().await?) }

    /// Soft-deletes or restores a category together with all of its products.
    #[instrument(skip(self))]
    pub async fn set_category_deleted(&self, id: Uuid, deleted: bool) -> Result<u64> {
        let products = self.store.set_category_deleted(id, deleted).await?;
        info!(products, deleted, "category cascade applied");
        let event = if deleted {
            CatalogEvent::CategoryDeleted { category_id: id, products }
        } else {
            CatalogEvent::CategoryRestored { category_id: id, products }
        };
        self.outbox.emit(DomainEvent::Catalog(event)).await;
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tests::harness;
    use crate::store::{CatalogStore, StoreError};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn draft(name: &str, category_id: Uuid, qty: u32) -> NewProduct {
        NewProduct {
            name: name.into(), description: "desc".into(), cost: dec!(10), price: dec!(20), discount_percentage: Decimal::ZERO,
            total_quantity: qty, category_id, is_featured: false, images: vec![],
        }
    }

    #[tokio::test]
    async fn batch_upload_reports_failures_per_entry() {
        let h = harness();
        let cat = h.services.catalog.create_category("Kitchen", None, None).await.unwrap();
        let batch = h.services.catalog
            .create_products(vec![draft("Pan", cat.id, 4), draft("", cat.id, 4), draft("Pot", Uuid::now_v7(), 4)])
            .await
            .unwrap();
        assert_eq!(batch.successful_uploads.len(), 1);
        assert_eq!(batch.successful_uploads[0].stock, 4);
        let reasons: Vec<_> = batch.failed_uploads.iter().map(|f| f.reason.as_str()).collect();
        assert_eq!(reasons, ["Product name is required", "Category not found"]);
    }

    #[tokio::test]
    async fn duplicate_category_names_conflict() {
        let h = harness();
        h.services.catalog.create_category("Garden", None, None).await.unwrap();
        let err = h.services.catalog.create_category("garden", None, None).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Store(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn defective_stock_needs_a_reason_and_is_logged() {
        let h = harness();
        let cat = h.services.catalog.create_category("Tools", None, None).await.unwrap();
        let batch = h.services.catalog.create_products(vec![draft("Saw", cat.id, 5)]).await.unwrap();
        let saw = &batch.successful_uploads[0];

        let err = h.services.catalog.adjust_stock(saw.id, StockAction::Defective, 2, Some("  ".into())).await.unwrap_err();
        assert!(matches!(err, StorefrontError::BadRequest(_)));

        let saw = h.services.catalog.adjust_stock(saw.id, StockAction::Defective, 2, Some("bent blade".into())).await.unwrap();
        assert_eq!((saw.stock, saw.defected, saw.total_quantity), (3, 2, 5));
        assert_eq!(h.services.catalog.defective_records(saw.id).await.unwrap()[0].reason, "bent blade");
        assert_eq!(h.recorder.events.lock().unwrap().len(), 1);

        let err = h.services.catalog.adjust_stock(saw.id, StockAction::Remove, 9, None).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Store(StoreError::InsufficientStock(_))));
    }

    #[tokio::test]
    async fn restoring_a_product_requires_a_live_category() {
        let h = harness();
        let cat = h.services.catalog.create_category("Toys", None, None).await.unwrap();
        let batch = h.services.catalog.create_products(vec![draft("Kite", cat.id, 1)]).await.unwrap();
        let kite = batch.successful_uploads[0].id;
        assert_eq!(h.services.catalog.set_category_deleted(cat.id, true).await.unwrap(), 1);
        assert!(h.store.product(kite).await.unwrap().unwrap().is_deleted);
        assert!(h.services.catalog.set_product_deleted(kite, false).await.is_err());
        h.services.catalog.set_category_deleted(cat.id, false).await.unwrap();
        assert!(!h.store.product(kite).await.unwrap().unwrap().is_deleted);
    }
}

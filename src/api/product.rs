use axum::{
    extract::State,
    routing::{get, patch, put},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::api::{ApiResponse, ApiResult, AppState, JsonBody, PageParams, PathId, QueryParams, ValidJson};
use crate::auth::AdminSession;
use crate::domain::aggregates::{DefectiveProduct, NewProduct, Product, ProductPatch, StockAction, StockFilter};
use crate::domain::value_objects::{ImageRef, Page, PageRequest};
use crate::services::catalog::BatchUpload;
use crate::store::{ProductListing, ProductQuery};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/product", get(list_products).post(create_products))
        .route("/product/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/product/:id/restore", patch(restore_product))
        .route("/product/:id/quantity", put(adjust_quantity))
        .route("/product/:id/defective", get(defective_records))
        .route("/product/category/:id", get(products_in_category))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    pub description: String,
    pub cost: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub discount_percentage: Decimal,
    pub total_quantity: u32,
    pub category_id: Uuid,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

impl From<ProductInput> for NewProduct {
    fn from(p: ProductInput) -> Self {
        NewProduct {
            name: p.name, description: p.description, cost: p.cost, price: p.price,
            discount_percentage: p.discount_percentage, total_quantity: p.total_quantity,
            category_id: p.category_id, is_featured: p.is_featured, images: p.images,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProducts { pub products: Vec<ProductInput> }

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub filter: Option<StockFilter>,
    pub search: Option<String>,
    #[serde(default)]
    pub show_deleted: bool,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuantityRequest {
    pub action: StockAction,
    #[validate(range(min = 1))]
    pub quantity: u32,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<ProductListing>,
    pub total_products: u64,
    pub current_page: u32,
    pub total_pages: u64,
}

impl ProductPage {
    fn new(page: Page<ProductListing>, req: PageRequest) -> Self {
        Self { total_pages: req.total_pages(page.total), total_products: page.total, current_page: req.page, products: page.items }
    }
}

async fn list_products(State(s): State<AppState>, QueryParams(p): QueryParams<ListParams>) -> ApiResult<ProductPage> {
    let page = PageRequest::new(p.page, p.limit, 10);
    let query = ProductQuery {
        search: p.search.filter(|q| !q.trim().is_empty()),
        stock: p.filter,
        show_deleted: p.show_deleted,
        category_id: None,
        page,
    };
    let found = s.services.catalog.list_products(&query).await?;
    Ok(ApiResponse::ok("Products fetched successfully", ProductPage::new(found, page)))
}

async fn create_products(_: AdminSession, State(s): State<AppState>, JsonBody(r): JsonBody<CreateProducts>) -> ApiResult<BatchUpload> {
    let batch = s.services.catalog.create_products(r.products.into_iter().map(NewProduct::from).collect()).await?;
    Ok(ApiResponse::created("Products processed", batch))
}

async fn get_product(State(s): State<AppState>, PathId(id): PathId) -> ApiResult<Product> {
    Ok(ApiResponse::ok("Product fetched successfully", s.services.catalog.product(id).await?))
}

async fn update_product(_: AdminSession, State(s): State<AppState>, PathId(id): PathId, JsonBody(patch): JsonBody<ProductPatch>) -> ApiResult<Product> {
    Ok(ApiResponse::ok("Product updated successfully", s.services.catalog.update_product(id, patch).await?))
}

async fn delete_product(_: AdminSession, State(s): State<AppState>, PathId(id): PathId) -> ApiResult<Product> {
    Ok(ApiResponse::ok("Product deleted successfully", s.services.catalog.set_product_deleted(id, true).await?))
}

async fn restore_product(_: AdminSession, State(s): State<AppState>, PathId(id): PathId) -> ApiResult<Product> {
    Ok(ApiResponse::ok("Product restored successfully", s.services.catalog.set_product_deleted(id, false).await?))
}

async fn adjust_quantity(_: AdminSession, State(s): State<AppState>, PathId(id): PathId, ValidJson(r): ValidJson<QuantityRequest>) -> ApiResult<Product> {
    let product = s.services.catalog.adjust_stock(id, r.action, r.quantity, r.reason).await?;
    Ok(ApiResponse::ok("Product quantity updated successfully", product))
}

async fn defective_records(_: AdminSession, State(s): State<AppState>, PathId(id): PathId) -> ApiResult<Vec<DefectiveProduct>> {
    Ok(ApiResponse::ok("Defective records fetched successfully", s.services.catalog.defective_records(id).await?))
}

async fn products_in_category(State(s): State<AppState>, PathId(id): PathId, QueryParams(p): QueryParams<PageParams>) -> ApiResult<ProductPage> {
    let page = p.request();
    let found = s.services.catalog.products_in_category(id, page).await?;
    Ok(ApiResponse::ok("Products fetched successfully", ProductPage::new(found, page)))
}

use axum::{extract::State, routing::{get, put}, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::api::{ApiResponse, ApiResult, AppState, PathId, ValidJson};
use crate::auth::AdminSession;
use crate::domain::aggregates::{Category, CategorySummary};
use crate::domain::value_objects::ImageRef;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/category", get(list_categories).post(create_category))
        .route("/category/:id", put(restore_category).delete(delete_category))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1))]
    pub name: String,
    pub description: Option<String>,
    pub image: Option<ImageRef>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cascade {
    pub category_id: Uuid,
    pub products_affected: u64,
}

async fn list_categories(State(s): State<AppState>) -> ApiResult<Vec<CategorySummary>> {
    Ok(ApiResponse::ok("Categories fetched successfully", s.services.catalog.categories().await?))
}

async fn create_category(_: AdminSession, State(s): State<AppState>, ValidJson(r): ValidJson<CreateCategoryRequest>) -> ApiResult<Category> {
    let category = s.services.catalog.create_category(&r.name, r.description, r.image).await?;
    Ok(ApiResponse::created("Category created successfully", category))
}

async fn delete_category(_: AdminSession, State(s): State<AppState>, PathId(id): PathId) -> ApiResult<Cascade> {
    let products_affected = s.services.catalog.set_category_deleted(id, true).await?;
    Ok(ApiResponse::ok("Category and its products deleted successfully", Cascade { category_id: id, products_affected }))
}

async fn restore_category(_: AdminSession, State(s): State<AppState>, PathId(id): PathId) -> ApiResult<Cascade> {
    let products_affected = s.services.catalog.set_category_deleted(id, false).await?;
    Ok(ApiResponse::ok("Category and its products restored successfully", Cascade { category_id: id, products_affected }))
}

//! Category Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::ImageRef;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub image: Option<ImageRef>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Category listing row with the number of products filed under it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub id: Uuid,
    pub name: String,
    pub is_deleted: bool,
    pub total_products: u64,
}

impl Category {
    pub fn create(name: &str, description: Option<String>, image: Option<ImageRef>) -> Result<Self, CategoryError> {
        let name = name.trim();
        if name.is_empty() { return Err(CategoryError::MissingName); }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), name: name.to_string(),
            description: description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            image, is_deleted: false, created_at: now, updated_at: now,
        })
    }

    /// Case-insensitive key used for the uniqueness check on names.
    pub fn name_key(&self) -> String { self.name.to_lowercase() }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    #[error("Category name is required")]
    MissingName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_trims_fields() {
        let c = Category::create("  Kitchen ", Some("  ".into()), None).unwrap();
        assert_eq!(c.name, "Kitchen");
        assert_eq!(c.description, None);
        assert_eq!(c.name_key(), "kitchen");
        assert_eq!(Category::create(" ", None, None), Err(CategoryError::MissingName));
    }
}

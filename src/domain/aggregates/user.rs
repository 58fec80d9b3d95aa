//! User Aggregate

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::ImageRef;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub avatar: Option<ImageRef>,
    pub phone: String,
    pub role: Role,
    pub status: UserStatus,
    /// Saved product ids, oldest first.
    #[serde(default)]
    pub wishlist: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile edit; blank or missing fields keep the stored value.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { #[default] User, Admin }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus { #[default] Active, Inactive, Suspended }

impl Role {
    pub fn as_str(&self) -> &'static str { match self { Self::User => "user", Self::Admin => "admin" } }
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Active => "active", Self::Inactive => "inactive", Self::Suspended => "suspended" }
    }
}

impl FromStr for UserStatus {
    type Err = UserError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            other => Err(UserError::InvalidStatus(other.to_string())),
        }
    }
}

impl User {
    /// Registers a customer as handed over by the identity provider.
    pub fn register(name: &str, email: &str, avatar: Option<ImageRef>) -> Result<Self, UserError> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() { return Err(UserError::MissingName); }
        if !email.contains('@') { return Err(UserError::InvalidEmail(email)); }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), name: name.to_string(), email, avatar, phone: String::new(),
            role: Role::User, status: UserStatus::Active, wishlist: Vec::new(), created_at: now, updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool { self.status == UserStatus::Active }

    pub fn update_profile(&mut self, patch: ProfilePatch) -> Result<(), UserError> {
        let filled = |v: Option<String>| v.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(email) = filled(patch.email) {
            let email = normalize_email(&email);
            if !email.contains('@') { return Err(UserError::InvalidEmail(email)); }
            self.email = email;
        }
        if let Some(name) = filled(patch.name) { self.name = name; }
        if let Some(phone) = filled(patch.phone) { self.phone = phone; }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Adds the product if absent, removes it otherwise. Returns `true` when added.
    pub fn toggle_wishlist(&mut self, product_id: Uuid) -> bool {
        let before = self.wishlist.len();
        self.wishlist.retain(|id| *id != product_id);
        let added = self.wishlist.len() == before;
        if added { self.wishlist.push(product_id); }
        self.updated_at = Utc::now();
        added
    }
}

pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserError {
    #[error("Name is required")]
    MissingName,
    #[error("Invalid email: {0}")]
    InvalidEmail(String),
    #[error("Invalid status. Allowed values: active, inactive, suspended (got {0})")]
    InvalidStatus(String),
}

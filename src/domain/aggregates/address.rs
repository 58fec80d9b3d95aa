//! Address Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_COUNTRY: &str = "India";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub phone_number: String,
    pub alternate_phone_number: Option<String>,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub address_type: AddressType,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressType { Home, Work, Other }

impl AddressType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Home => "Home", Self::Work => "Work", Self::Other => "Other" }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAddress {
    pub full_name: String,
    pub phone_number: String,
    pub alternate_phone_number: Option<String>,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: Option<String>,
    pub address_type: AddressType,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressPatch {
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub alternate_phone_number: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub address_type: Option<AddressType>,
    pub is_default: Option<bool>,
}

impl Address {
    pub fn create(user_id: Uuid, draft: NewAddress) -> Result<Self, AddressError> {
        let now = Utc::now();
        let address = Self {
            id: Uuid::now_v7(), user_id,
            full_name: draft.full_name.trim().to_string(),
            phone_number: draft.phone_number.trim().to_string(),
            alternate_phone_number: draft.alternate_phone_number.filter(|p| !p.trim().is_empty()),
            street_address: draft.street_address.trim().to_string(),
            city: draft.city.trim().to_string(),
            state: draft.state.trim().to_string(),
            postal_code: draft.postal_code.trim().to_string(),
            country: country_or_default(draft.country),
            address_type: draft.address_type,
            is_default: draft.is_default,
            created_at: now, updated_at: now,
        };
        address.validate()?;
        Ok(address)
    }

    pub fn apply(&mut self, patch: AddressPatch) -> Result<(), AddressError> {
        let mut next = self.clone();
        if let Some(v) = patch.full_name { next.full_name = v.trim().to_string(); }
        if let Some(v) = patch.phone_number { next.phone_number = v.trim().to_string(); }
        if let Some(v) = patch.alternate_phone_number { next.alternate_phone_number = Some(v).filter(|p| !p.trim().is_empty()); }
        if let Some(v) = patch.street_address { next.street_address = v.trim().to_string(); }
        if let Some(v) = patch.city { next.city = v.trim().to_string(); }
        if let Some(v) = patch.state { next.state = v.trim().to_string(); }
        if let Some(v) = patch.postal_code { next.postal_code = v.trim().to_string(); }
        if let Some(v) = patch.country { next.country = country_or_default(Some(v)); }
        if let Some(v) = patch.address_type { next.address_type = v; }
        if let Some(v) = patch.is_default { next.is_default = v; }
        next.validate()?;
        next.updated_at = Utc::now();
        *self = next;
        Ok(())
    }

    fn validate(&self) -> Result<(), AddressError> {
        let required = [
            ("fullName", &self.full_name), ("phoneNumber", &self.phone_number), ("streetAddress", &self.street_address),
            ("city", &self.city), ("state", &self.state), ("postalCode", &self.postal_code),
        ];
        match required.iter().find(|(_, v)| v.is_empty()) {
            Some((field, _)) => Err(AddressError::MissingField(*field)),
            None => Ok(()),
        }
    }
}

fn country_or_default(country: Option<String>) -> String {
    country.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).unwrap_or_else(|| DEFAULT_COUNTRY.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("All required fields must be provided: {0} is missing")]
    MissingField(&'static str),
}

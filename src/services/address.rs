use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{Address, AddressPatch, NewAddress};
use crate::error::{Result, StorefrontError};
use crate::store::Store;

#[derive(Clone)]
pub struct AddressService {
    store: Arc<dyn Store>,
}

impl AddressService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    #[instrument(skip(self, draft))]
    pub async fn create(&self, user_id: Uuid, draft: NewAddress) -> Result<Address> {
        let address = Address::create(user_id, draft)?;
        self.store.save_address(&address).await?;
        info!(address_id = %address.id, "address saved");
        Ok(address)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Address>> { Ok(self.store.addresses_for_user(user_id).await?) }

    /// `viewer` is the customer asking, or `None` for the admin who may read any address.
    pub async fn address(&self, id: Uuid, viewer: Option<Uuid>) -> Result<Address> {
        self.store
            .address(id)
            .await?
            .filter(|a| viewer.map_or(true, |u| a.user_id == u))
            .ok_or_else(|| StorefrontError::not_found("Address"))
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, user_id: Uuid, id: Uuid, patch: AddressPatch) -> Result<Address> {
        let mut address = self.address(id, Some(user_id)).await?;
        address.apply(patch)?;
        self.store.save_address(&address).await?;
        Ok(address)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        if !self.store.delete_address(user_id, id).await? { return Err(StorefrontError::not_found("Address")); }
        Ok(())
    }
}

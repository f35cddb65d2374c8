use std::sync::Arc;

use axum::http::StatusCode;

use super::{Address, AddressPatch, AddressStore, NewAddress};
use crate::error::{Result, ServerError};

pub const MAX_ADDRESSES: i64 = 5;

/// Keeps an owner's address set bounded, with exactly one primary once
/// anything was added.
#[derive(Clone)]
pub struct AddressInvariantManager {
    store: Arc<dyn AddressStore>,
}

impl AddressInvariantManager {
    /// Create a new [`AddressInvariantManager`].
    pub fn new(store: Arc<dyn AddressStore>) -> Self {
        Self { store }
    }

    pub async fn add(&self, owner: &str, address: &NewAddress) -> Result<Vec<Address>> {
        let count = self.store.count(owner).await?;
        if count >= MAX_ADDRESSES {
            return Err(ServerError::validation(format!(
                "Maximum {MAX_ADDRESSES} addresses are allowed"
            )));
        }

        let id = self.store.insert(owner, address, count == 0).await?;
        tracing::debug!(%owner, id, "address added");

        self.store.list(owner).await
    }

    pub async fn set_primary(&self, owner: &str, id: i64) -> Result<Vec<Address>> {
        let addresses = self.store.list(owner).await?;
        let Some(target) = addresses.iter().find(|a| a.id == id) else {
            return Err(ServerError::validation("Unknown address ID"));
        };

        if target.is_primary {
            return Ok(addresses);
        }

        // The address may have been removed since it was listed.
        if self.store.set_primary(owner, id).await? == 0 {
            return Err(ServerError::validation("Unknown address ID"));
        }
        self.store.list(owner).await
    }

    /// Removing the primary leaves the owner without one.
    pub async fn remove(&self, owner: &str, id: i64) -> Result<Vec<Address>> {
        if self.store.soft_delete(owner, id).await? == 0 {
            return Err(ServerError::validation("Address not found"));
        }

        self.store.list(owner).await
    }

    pub async fn update(
        &self,
        owner: &str,
        id: i64,
        patch: &AddressPatch,
    ) -> Result<Vec<Address>> {
        if patch.is_empty() || self.store.update(owner, id, patch).await? == 0 {
            return Err(ServerError::validation("Nothing to update"));
        }

        self.store.list(owner).await
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<Address>> {
        self.store.list(owner).await
    }

    pub async fn primary(&self, owner: &str) -> Result<Address> {
        self.store
            .list(owner)
            .await?
            .into_iter()
            .find(|a| a.is_primary)
            .ok_or_else(|| {
                ServerError::http(StatusCode::EXPECTATION_FAILED, "No default address")
            })
    }
}

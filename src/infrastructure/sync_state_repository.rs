use crate::domain::models::SyncState;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::{SYNC_STATE_KEY, StoreHandle};
use std::sync::Arc;

pub const SYNC_STATE_TTL_SECONDS: u64 = 3600;

#[derive(Clone)]
pub struct SyncStateRepository {
    store: Arc<StoreHandle>,
}

impl SyncStateRepository {
    pub fn new(store: Arc<StoreHandle>) -> Self {
        Self { store }
    }

    /// `Ok(None)` when the key is absent or expired; a stored record that no longer parses is a
    /// `Json` error.
    pub async fn load(&self) -> Result<Option<SyncState>, InfraError> {
        let store = self.store.store().await?;
        let Some(raw) = store.get(SYNC_STATE_KEY).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(raw)?))
    }

    pub async fn save(&self, state: &SyncState) -> Result<(), InfraError> {
        let store = self.store.store().await?;
        let value = serde_json::to_value(state)?;
        store
            .set(SYNC_STATE_KEY, &value, Some(SYNC_STATE_TTL_SECONDS))
            .await
    }
}

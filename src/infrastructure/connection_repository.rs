use crate::domain::models::{ConnectionHistory, ConnectionSnapshot, ConnectionState};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::{CONNECTION_HISTORY_KEY, CONNECTION_STATE_KEY, StoreHandle};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Live state and history are stored under two keys without expiry.
#[derive(Clone)]
pub struct ConnectionRepository {
    store: Arc<StoreHandle>,
}

impl ConnectionRepository {
    pub fn new(store: Arc<StoreHandle>) -> Self {
        Self { store }
    }

    async fn load_record<T>(&self, key: &str) -> Result<Option<T>, InfraError>
    where
        T: DeserializeOwned,
    {
        let store = self.store.store().await?;
        match store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_value(raw)?)),
            None => Ok(None),
        }
    }

    pub async fn load_state(&self) -> Result<Option<ConnectionState>, InfraError> {
        self.load_record(CONNECTION_STATE_KEY).await
    }

    pub async fn load_history(&self) -> Result<Option<ConnectionHistory>, InfraError> {
        self.load_record(CONNECTION_HISTORY_KEY).await
    }

    pub async fn save_state(&self, state: &ConnectionState) -> Result<(), InfraError> {
        let store = self.store.store().await?;
        store
            .set(CONNECTION_STATE_KEY, &serde_json::to_value(state)?, None)
            .await
    }

    pub async fn save(&self, snapshot: &ConnectionSnapshot) -> Result<(), InfraError> {
        self.save_state(&snapshot.state).await?;
        let store = self.store.store().await?;
        store
            .set(
                CONNECTION_HISTORY_KEY,
                &serde_json::to_value(&snapshot.history)?,
                None,
            )
            .await
    }
}

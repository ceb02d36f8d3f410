use crate::domain::api::{
    ConnectionActionRequest, ConnectionActionResponse, ErrorBody, SyncStateEnvelope,
};
use crate::domain::models::{
    ConnectionAction, ConnectionSnapshot, IdeKind, SyncState, SyncStatePatch,
};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const SYNC_STATE_PATH: &str = "sync-state";
const IDE_CONNECTION_PATH: &str = "ide-connection";

/// Client side of the sync service, shared by the dashboard poller and the editor agent.
#[async_trait]
pub trait SyncApi: Send + Sync {
    async fn fetch_state(&self) -> Result<SyncState, InfraError>;

    /// Returns the merged record the server stored.
    async fn update_state(&self, patch: &SyncStatePatch) -> Result<SyncState, InfraError>;

    async fn reset_state(&self) -> Result<SyncState, InfraError>;

    async fn fetch_connection(&self) -> Result<ConnectionSnapshot, InfraError>;

    async fn send_connection_action(
        &self,
        action: ConnectionAction,
        ide: Option<IdeKind>,
    ) -> Result<ConnectionActionResponse, InfraError>;

    async fn reset_connection(&self) -> Result<ConnectionSnapshot, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestSyncApiClient {
    client: Client,
    sync_state_url: Url,
    ide_connection_url: Url,
}

impl ReqwestSyncApiClient {
    pub fn new(base_url: &Url) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| InfraError::Http(format!("failed to build http client: {error}")))?;
        let join = |path: &str| {
            base_url.join(path).map_err(|error| {
                InfraError::InvalidConfig(format!("invalid base url '{base_url}': {error}"))
            })
        };
        Ok(Self {
            client,
            sync_state_url: join(SYNC_STATE_PATH)?,
            ide_connection_url: join(IDE_CONNECTION_PATH)?,
        })
    }

    async fn execute<T>(&self, request: RequestBuilder, what: &str) -> Result<T, InfraError>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await.map_err(|error| {
            InfraError::Unavailable(format!("network error while {what}: {error}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Unavailable(format!("failed reading response while {what}: {error}"))
        })?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .map(|parsed| parsed.error)
                .unwrap_or(body);
            return Err(InfraError::Http(format!(
                "sync api error while {what}: http {}; {detail}",
                status.as_u16()
            )));
        }

        serde_json::from_str(&body).map_err(|error| {
            InfraError::Http(format!("invalid payload while {what}: {error}; body={body}"))
        })
    }
}

#[async_trait]
impl SyncApi for ReqwestSyncApiClient {
    async fn fetch_state(&self) -> Result<SyncState, InfraError> {
        let request = self.client.get(self.sync_state_url.clone());
        self.execute(request, "fetching sync state").await
    }

    async fn update_state(&self, patch: &SyncStatePatch) -> Result<SyncState, InfraError> {
        let request = self.client.post(self.sync_state_url.clone()).json(patch);
        let envelope: SyncStateEnvelope = self.execute(request, "updating sync state").await?;
        Ok(envelope.state)
    }

    async fn reset_state(&self) -> Result<SyncState, InfraError> {
        let request = self.client.delete(self.sync_state_url.clone());
        let envelope: SyncStateEnvelope = self.execute(request, "resetting sync state").await?;
        Ok(envelope.state)
    }

    async fn fetch_connection(&self) -> Result<ConnectionSnapshot, InfraError> {
        let request = self.client.get(self.ide_connection_url.clone());
        self.execute(request, "fetching ide connection").await
    }

    async fn send_connection_action(
        &self,
        action: ConnectionAction,
        ide: Option<IdeKind>,
    ) -> Result<ConnectionActionResponse, InfraError> {
        let body = ConnectionActionRequest {
            action: action.as_str().to_string(),
            ide: ide.map(|ide| ide.as_str().to_string()),
        };
        let request = self.client.post(self.ide_connection_url.clone()).json(&body);
        let what = format!("sending {} action", action.as_str());
        self.execute(request, &what).await
    }

    async fn reset_connection(&self) -> Result<ConnectionSnapshot, InfraError> {
        let request = self.client.delete(self.ide_connection_url.clone());
        self.execute(request, "resetting ide connection").await
    }
}

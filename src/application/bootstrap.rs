use crate::application::connection_service::ConnectionService;
use crate::application::http_api::AppState;
use crate::application::sync_state_service::SyncStateService;
use crate::infrastructure::config::{ServerConfig, StoreConfig};
use crate::infrastructure::connection_repository::ConnectionRepository;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::StoreHandle;
use crate::infrastructure::sync_state_repository::SyncStateRepository;
use chrono_tz::Tz;
use std::fs;
use std::sync::Arc;

pub struct BootstrapResult {
    pub state: AppState,
    pub backend: &'static str,
}

/// Prepares the store location and wires both services onto one shared store handle. The store
/// itself is built lazily on first request.
pub fn bootstrap_server(config: &ServerConfig) -> Result<BootstrapResult, InfraError> {
    if let StoreConfig::File { root } = &config.store {
        fs::create_dir_all(root)?;
    }

    let handle = Arc::new(StoreHandle::new(config.store.clone()));
    Ok(BootstrapResult {
        state: build_app_state(handle, config.timezone),
        backend: config.store.backend_name(),
    })
}

pub fn build_app_state(handle: Arc<StoreHandle>, timezone: Tz) -> AppState {
    let sync = SyncStateService::new(SyncStateRepository::new(Arc::clone(&handle)));
    let connection = ConnectionService::new(ConnectionRepository::new(handle), timezone);
    AppState::new(sync, connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::TempStateDir;
    use crate::domain::models::{SyncStatePatch, TimerMode};
    use std::net::SocketAddr;

    fn file_config(root: &std::path::Path) -> ServerConfig {
        ServerConfig {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            store: StoreConfig::File {
                root: root.join("store"),
            },
            timezone: chrono_tz::Europe::Berlin,
        }
    }

    #[test]
    fn file_backend_creates_its_data_dir() {
        let dir = TempStateDir::new();
        let config = file_config(&dir.path);

        let result = bootstrap_server(&config).expect("bootstrap");
        assert_eq!(result.backend, "file");
        assert!(dir.path.join("store").is_dir());
    }

    #[tokio::test]
    async fn file_backed_state_survives_a_second_bootstrap() {
        let dir = TempStateDir::new();
        let config = file_config(&dir.path);

        let first = bootstrap_server(&config).expect("bootstrap");
        first
            .state
            .sync
            .merge(&SyncStatePatch {
                mode: Some(TimerMode::LongBreak),
                ..SyncStatePatch::default()
            })
            .await
            .expect("merge");

        let second = bootstrap_server(&config).expect("bootstrap again");
        assert_eq!(second.state.sync.get().await.mode, TimerMode::LongBreak);
    }

    #[test]
    fn memory_backend_needs_no_filesystem() {
        let config = ServerConfig {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            store: StoreConfig::Memory,
            timezone: Tz::UTC,
        };
        assert_eq!(bootstrap_server(&config).expect("bootstrap").backend, "memory");
    }
}

use crate::infrastructure::config::StoreConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::rest_kv_store::RestKeyValueStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::info;

pub const SYNC_STATE_KEY: &str = "pomosync:sync-state";
pub const CONNECTION_STATE_KEY: &str = "pomosync:ide-connection:state";
pub const CONNECTION_HISTORY_KEY: &str = "pomosync:ide-connection:history";

static NEXT_TEMP_FILE: AtomicU64 = AtomicU64::new(0);

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, InfraError>;

    async fn set(&self, key: &str, value: &Value, ttl_seconds: Option<u64>)
        -> Result<(), InfraError>;

    fn backend_name(&self) -> &'static str;
}

/// One JSON file per key. Expiry is accepted and ignored.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, InfraError> {
        let file_stem = sanitize_key(key)?;
        Ok(self.root.join(format!("{file_stem}.json")))
    }
}

fn sanitize_key(key: &str) -> Result<String, InfraError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(InfraError::Store("store key must not be empty".to_string()));
    }
    Ok(key
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect())
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, InfraError> {
        let path = self.path_for(key)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn set(
        &self,
        key: &str,
        value: &Value,
        _ttl_seconds: Option<u64>,
    ) -> Result<(), InfraError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let sequence = NEXT_TEMP_FILE.fetch_add(1, Ordering::Relaxed);
        let temp_path = path.with_extension(format!("{}-{sequence}.tmp", std::process::id()));
        let formatted = serde_json::to_string_pretty(value)?;
        tokio::fs::write(&temp_path, format!("{formatted}\n")).await?;
        if let Err(error) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(error.into());
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl InMemoryKeyValueStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryEntry>>, InfraError> {
        self.entries
            .lock()
            .map_err(|error| InfraError::Store(format!("memory store lock poisoned: {error}")))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, InfraError> {
        let mut entries = self.lock()?;
        let expired = entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .map(|expires_at| Instant::now() >= expires_at)
            .unwrap_or(false);
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: &Value,
        ttl_seconds: Option<u64>,
    ) -> Result<(), InfraError> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.clone(),
                expires_at: ttl_seconds.map(|ttl| Instant::now() + Duration::from_secs(ttl)),
            },
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Process-wide store, built on first use from the startup configuration. Concurrent first
/// callers share one construction; a failed construction is retried by the next caller.
pub struct StoreHandle {
    config: StoreConfig,
    store: OnceCell<Arc<dyn KeyValueStore>>,
}

impl StoreHandle {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            store: OnceCell::new(),
        }
    }

    pub fn with_store(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            config: StoreConfig::Memory,
            store: OnceCell::new_with(Some(store)),
        }
    }

    pub async fn store(&self) -> Result<Arc<dyn KeyValueStore>, InfraError> {
        let store = self
            .store
            .get_or_try_init(|| async { build_store(&self.config) })
            .await?;
        Ok(Arc::clone(store))
    }
}

fn build_store(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>, InfraError> {
    let store: Arc<dyn KeyValueStore> = match config {
        StoreConfig::Rest { url, token } => Arc::new(RestKeyValueStore::new(url.clone(), token)?),
        StoreConfig::File { root } => Arc::new(FileKeyValueStore::new(root)),
        StoreConfig::Memory => Arc::new(InMemoryKeyValueStore::default()),
    };
    info!(event = "store_initialized", backend = store.backend_name());
    Ok(store)
}

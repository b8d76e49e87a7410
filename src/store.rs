//! Key/value state shared between the plugin's RPC and transaction entry
//! points. Only the verified-identity record lives here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use crate::error::{InsightError, InsightResult};

pub const IDENTITY_KEY: &str = "identity";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub world_id: String,
}

/// Single-key get / atomic replace
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> InsightResult<Option<Value>>;
    async fn put(&self, key: &str, value: Value) -> InsightResult<()>;
}

pub async fn load_identity(store: &dyn StateStore) -> InsightResult<Option<IdentityRecord>> {
    match store.get(IDENTITY_KEY).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| InsightError::Store(format!("corrupt identity record: {}", e))),
        None => Ok(None),
    }
}

pub async fn save_identity(store: &dyn StateStore, record: &IdentityRecord) -> InsightResult<()> {
    let value = serde_json::to_value(record).map_err(|e| InsightError::Store(e.to_string()))?;
    store.put(IDENTITY_KEY, value).await
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> InsightResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> InsightResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// JSON object on disk; writes go through a temp file and a rename
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> InsightResult<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            InsightError::Store(format!("Failed to read {:?}: {}", self.path, e))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| InsightError::Store(format!("Failed to parse {:?}: {}", self.path, e)))
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn get(&self, key: &str) -> InsightResult<Option<Value>> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn put(&self, key: &str, value: Value) -> InsightResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    InsightError::Store(format!("Failed to create directory {:?}: {}", parent, e))
                })?;
            }
        }

        let content = serde_json::to_string_pretty(&entries)
            .map_err(|e| InsightError::Store(e.to_string()))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| InsightError::Store(format!("Failed to write {:?}: {}", tmp_path, e)))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| InsightError::Store(format!("Failed to replace {:?}: {}", self.path, e)))?;

        tracing::debug!("Stored {} in {:?}", key, self.path);
        Ok(())
    }
}

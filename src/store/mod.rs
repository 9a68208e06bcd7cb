//! Durable key-value store
//!
//! The trading core only needs get/set/delete by key plus key listing.
//! Two implementations ship with the crate: an in-memory map for tests and
//! dry runs, and a JSON file that survives restarts.

pub mod stats;
pub mod trades;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub use stats::Statistics;
pub use trades::TradesDao;

pub const SURVIVOR_SCORES_KEY: &str = "SurvivorScores";
pub const STABLE_COINS_KEY: &str = "StableCoins";
pub const STATISTICS_KEY: &str = "Statistics";
pub const CONFIG_KEY: &str = "Config";

pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    fn set(&self, key: &str, value: Value) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    fn keys(&self) -> Result<Vec<String>>;
}

/// Read and decode a typed value. A present but malformed value is an error.
pub fn get_typed<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| Error::Deserialization {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

pub fn set_typed<T: Serialize>(store: &dyn Store, key: &str, value: &T) -> Result<()> {
    store.set(key, serde_json::to_value(value)?)
}

/// Volatile store, used by tests and `--dry-run`
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let data = self.data.read().map_err(|e| Error::Store(e.to_string()))?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut data = self.data.write().map_err(|e| Error::Store(e.to_string()))?;
        data.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut data = self.data.write().map_err(|e| Error::Store(e.to_string()))?;
        data.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let data = self.data.read().map_err(|e| Error::Store(e.to_string()))?;
        Ok(data.keys().cloned().collect())
    }
}

/// Store persisted as one pretty-printed JSON document, rewritten on change
pub struct JsonFileStore {
    path: PathBuf,
    data: RwLock<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the store, loading existing content if the file exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| Error::Store(format!("{}: {}", path.display(), e)))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .map_err(|e| Error::Store(format!("{}: {}", path.display(), e)))?
            }
        } else {
            BTreeMap::new()
        };

        info!("Loaded {} keys from {}", data.len(), path.display());

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn save(&self, data: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).map_err(|e| Error::Store(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| Error::Store(e.to_string()))?;

        debug!("Saved {} keys to {}", data.len(), self.path.display());
        Ok(())
    }
}

impl Store for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let data = self.data.read().map_err(|e| Error::Store(e.to_string()))?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut data = self.data.write().map_err(|e| Error::Store(e.to_string()))?;
        data.insert(key.to_string(), value);
        self.save(&data)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut data = self.data.write().map_err(|e| Error::Store(e.to_string()))?;
        if data.remove(key).is_some() {
            self.save(&data)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let data = self.data.read().map_err(|e| Error::Store(e.to_string()))?;
        Ok(data.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.set("trade/BTC", json!({"a": 1})).unwrap();
        store.set("Statistics", json!({"total_profit": 3.5})).unwrap();
        store.delete("Statistics").unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("trade/BTC").unwrap(), Some(json!({"a": 1})));
        assert_eq!(reopened.keys().unwrap(), vec!["trade/BTC".to_string()]);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(Error::Store(_))));
    }

    #[test]
    fn test_typed_read_fails_fast() {
        let store = MemoryStore::new();
        store.set("n", json!("not a number")).unwrap();
        let res: Result<Option<u32>> = get_typed(&store, "n");
        assert!(matches!(res, Err(Error::Deserialization { .. })));

        let missing: Option<u32> = get_typed(&store, "missing").unwrap();
        assert!(missing.is_none());
    }
}
